//! Headless Chromium rendering through a long-lived Node.js + Playwright child process.
//!
//! One child process is one session: a browser and a context that serve every page of a
//! fetch batch. Requests and replies are newline-delimited JSON tagged with an id, so
//! several pages can render concurrently through the same session.

use crate::config::RenderSettings;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin};
use tokio::sync::oneshot;
use webbrief_core::{Error, PageRenderer, RenderSession, Result};

/// How long a fresh session may take to launch its browser.
const READY_TIMEOUT: Duration = Duration::from_secs(30);
/// Extra wall-clock allowance on top of the navigation timeout.
const RENDER_GRACE: Duration = Duration::from_secs(5);
/// How long `close` waits for a graceful exit before killing the process.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);
/// Pages larger than this are treated as failed renders.
const MAX_HTML_CHARS: usize = 5_000_000;

// Expected setup: Node.js on PATH, the `playwright` npm package resolvable by Node
// (global or NODE_PATH), and a Chromium build (`npx playwright install chromium`).
// stdout carries protocol lines only.
const JS: &str = r#"
const readline = require('readline');

function send(obj) { process.stdout.write(JSON.stringify(obj) + '\n'); }
function msg(e) { return String(e && e.message ? e.message : e); }

async function main() {
  let pw;
  try { pw = require('playwright'); } catch (e) {
    send({ id: 0, ok: false, error: 'Playwright is not installed for Node.js (require("playwright") failed)' });
    process.exit(0);
  }

  let browser, context;
  try {
    browser = await pw.chromium.launch({ headless: true });
    context = await browser.newContext();
  } catch (e) {
    send({ id: 0, ok: false, error: msg(e) });
    process.exit(0);
  }
  send({ id: 0, ok: true });

  let closing = false;
  const shutdown = async () => {
    if (closing) return;
    closing = true;
    try { await context.close(); } catch (_) {}
    try { await browser.close(); } catch (_) {}
    process.exit(0);
  };

  const rl = readline.createInterface({ input: process.stdin });
  rl.on('line', async (line) => {
    let req;
    try { req = JSON.parse(line); } catch (_) { return; }
    if (req.op === 'close') return shutdown();
    if (req.op !== 'render') return;
    let page;
    try {
      page = await context.newPage();
      await page.goto(String(req.url), { waitUntil: 'load', timeout: Number(req.timeout_ms || 15000) });
      send({ id: req.id, ok: true, html: await page.content() });
    } catch (e) {
      send({ id: req.id, ok: false, error: msg(e) });
    } finally {
      try { if (page) await page.close(); } catch (_) {}
    }
  });
  rl.on('close', shutdown);
}

main().catch((e) => { send({ id: 0, ok: false, error: msg(e) }); process.exit(1); });
"#;

#[derive(Debug, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum Request<'a> {
    Render {
        id: u64,
        url: &'a str,
        timeout_ms: u64,
    },
    Close,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Reply {
    pub id: u64,
    pub ok: bool,
    #[serde(default)]
    pub html: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Parse one protocol line; anything that is not a reply (stray output) is `None`.
pub fn parse_reply(line: &str) -> Option<Reply> {
    let line = line.trim();
    if !line.starts_with('{') {
        return None;
    }
    serde_json::from_str(line).ok()
}

fn node_path_candidates() -> Vec<String> {
    // Best-effort Node global module roots across common setups.
    let mut out: Vec<String> = Vec::new();
    if let Some(home) = std::env::var_os("HOME").map(std::path::PathBuf::from) {
        out.push(
            home.join(".npm-global")
                .join("lib")
                .join("node_modules")
                .to_string_lossy()
                .to_string(),
        );
    }
    out.push("/opt/homebrew/lib/node_modules".to_string());
    out.push("/usr/local/lib/node_modules".to_string());
    out.push("/usr/lib/node_modules".to_string());
    out
}

fn node_path_has_playwright(np: &str) -> bool {
    np.split(':')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .any(|p| std::path::Path::new(p).join("playwright").is_dir())
}

async fn npm_root_g() -> Option<String> {
    let out = tokio::process::Command::new("npm")
        .args(["root", "-g"])
        .kill_on_drop(true)
        .output()
        .await
        .ok()?;
    if !out.status.success() {
        return None;
    }
    let s = String::from_utf8_lossy(&out.stdout).trim().to_string();
    (!s.is_empty() && node_path_has_playwright(&s)).then_some(s)
}

/// NODE_PATH to hand the child so a globally installed Playwright resolves.
///
/// `None` means leave the inherited environment alone.
async fn detect_node_path_for_playwright(explicit: Option<&str>) -> Option<String> {
    if let Some(v) = explicit {
        return Some(v.to_string());
    }
    let existing = std::env::var("NODE_PATH").unwrap_or_default();
    if node_path_has_playwright(&existing) {
        return None;
    }
    let found = match npm_root_g().await {
        Some(root) => root,
        None => node_path_candidates()
            .into_iter()
            .find(|root| node_path_has_playwright(root))?,
    };
    if existing.trim().is_empty() {
        Some(found)
    } else {
        Some(format!("{existing}:{found}"))
    }
}

type Waiters = HashMap<u64, oneshot::Sender<Reply>>;
type Pending = Arc<Mutex<Waiters>>;

fn lock_pending(p: &Pending) -> std::sync::MutexGuard<'_, Waiters> {
    p.lock().unwrap_or_else(|e| e.into_inner())
}

#[derive(Debug, Clone)]
pub struct PlaywrightRenderer {
    settings: RenderSettings,
    /// NODE_PATH for the child, resolved on the first session and reused after that.
    node_path: Arc<tokio::sync::OnceCell<Option<String>>>,
}

impl PlaywrightRenderer {
    pub fn new(settings: RenderSettings) -> Self {
        Self {
            settings,
            node_path: Arc::default(),
        }
    }

    async fn node_path(&self) -> Option<&str> {
        self.node_path
            .get_or_init(|| detect_node_path_for_playwright(self.settings.node_path.as_deref()))
            .await
            .as_deref()
    }
}

#[async_trait::async_trait]
impl PageRenderer for PlaywrightRenderer {
    async fn open_session(&self) -> Result<Box<dyn RenderSession>> {
        // Deterministic escape hatch (tests and environments without local tooling).
        if self.settings.disabled {
            return Err(Error::NotConfigured(
                "render backend disabled (WEBBRIEF_RENDER_DISABLE)".to_string(),
            ));
        }
        let node_path = self.node_path().await;
        let session = PlaywrightSession::spawn(&self.settings.node_bin, node_path).await?;
        Ok(Box::new(session))
    }
}

pub struct PlaywrightSession {
    stdin: tokio::sync::Mutex<ChildStdin>,
    child: tokio::sync::Mutex<Child>,
    pending: Pending,
    next_id: AtomicU64,
    reader: tokio::task::JoinHandle<()>,
}

impl PlaywrightSession {
    async fn spawn(node_bin: &str, node_path: Option<&str>) -> Result<Self> {
        let mut cmd = tokio::process::Command::new(node_bin);
        if let Some(node_path) = node_path {
            cmd.env("NODE_PATH", node_path);
        }
        let mut child = cmd
            .arg("-e")
            .arg(JS)
            .kill_on_drop(true)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::null())
            .spawn()
            .map_err(|e| {
                Error::NotConfigured(format!(
                    "rendering requires Node.js (`{node_bin}`) and the Playwright npm package: {e}"
                ))
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::Render("missing stdin pipe".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Render("missing stdout pipe".to_string()))?;

        let pending: Pending = Arc::default();
        let (ready_tx, ready_rx) = oneshot::channel();
        lock_pending(&pending).insert(0, ready_tx);

        let reader_pending = pending.clone();
        let reader = tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                let Some(reply) = parse_reply(&line) else {
                    continue;
                };
                if let Some(tx) = lock_pending(&reader_pending).remove(&reply.id) {
                    let _ = tx.send(reply);
                }
            }
            // EOF: the process is gone; wake every waiter with a closed channel.
            lock_pending(&reader_pending).clear();
        });

        let session = Self {
            stdin: tokio::sync::Mutex::new(stdin),
            child: tokio::sync::Mutex::new(child),
            pending,
            next_id: AtomicU64::new(1),
            reader,
        };

        match tokio::time::timeout(READY_TIMEOUT, ready_rx).await {
            Ok(Ok(r)) if r.ok => {
                tracing::debug!("render session ready");
                Ok(session)
            }
            Ok(Ok(r)) => Err(Error::NotConfigured(
                r.error.unwrap_or_else(|| "browser launch failed".to_string()),
            )),
            Ok(Err(_)) => Err(Error::Render(
                "render process exited before it was ready".to_string(),
            )),
            Err(_) => Err(Error::Render(format!(
                "render process not ready after {}s",
                READY_TIMEOUT.as_secs()
            ))),
        }
    }

    async fn send(&self, req: &Request<'_>) -> Result<()> {
        let mut line = serde_json::to_string(req).map_err(|e| Error::Render(e.to_string()))?;
        line.push('\n');
        let mut stdin = self.stdin.lock().await;
        stdin
            .write_all(line.as_bytes())
            .await
            .map_err(|e| Error::Render(e.to_string()))?;
        stdin.flush().await.map_err(|e| Error::Render(e.to_string()))
    }
}

#[async_trait::async_trait]
impl RenderSession for PlaywrightSession {
    async fn render(&self, url: &str, timeout: Duration) -> Option<String> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        lock_pending(&self.pending).insert(id, tx);

        let req = Request::Render {
            id,
            url,
            timeout_ms: timeout.as_millis() as u64,
        };
        if let Err(e) = self.send(&req).await {
            lock_pending(&self.pending).remove(&id);
            tracing::debug!(url, error = %e, "render request could not be sent");
            return None;
        }

        let reply = match tokio::time::timeout(timeout + RENDER_GRACE, rx).await {
            Ok(Ok(r)) => r,
            Ok(Err(_)) => {
                tracing::debug!(url, "render session closed mid-request");
                return None;
            }
            Err(_) => {
                lock_pending(&self.pending).remove(&id);
                tracing::debug!(url, "render timed out");
                return None;
            }
        };
        if !reply.ok {
            let error = reply.error.as_deref().unwrap_or("");
            tracing::debug!(url, error, "render failed");
            return None;
        }
        reply
            .html
            .filter(|h| !h.trim().is_empty() && h.len() <= MAX_HTML_CHARS)
    }

    async fn close(self: Box<Self>) {
        if self.send(&Request::Close).await.is_ok() {
            let _ = self.stdin.lock().await.shutdown().await;
        }
        let mut child = self.child.lock().await;
        match tokio::time::timeout(CLOSE_TIMEOUT, child.wait()).await {
            Ok(_) => tracing::debug!("render session closed"),
            Err(_) => {
                tracing::warn!("render process did not exit; killing it");
                let _ = child.kill().await;
            }
        }
    }
}

impl Drop for PlaywrightSession {
    fn drop(&mut self) {
        // The child itself is killed by `kill_on_drop`.
        self.reader.abort();
    }
}
