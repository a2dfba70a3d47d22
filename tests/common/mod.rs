//! Shared helpers for integration tests: fake catalog tools and a server
//! bound to an ephemeral port.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;
use std::time::Duration;

use taginfo_stream::{ServerConfig, ServerError, serve_with_shutdown};
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// An executable shell script standing in for exiftool
pub struct FakeTool {
    dir: TempDir,
    pub path: PathBuf,
}

impl FakeTool {
    /// A tool running `body` as a shell script
    pub fn script(body: &str) -> Self {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("exiftool");
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        Self { dir, path }
    }

    /// A tool that prints `catalog` and exits successfully
    pub fn printing(catalog: &str) -> Self {
        let tool = Self::script("exec cat \"$(dirname \"$0\")/catalog.xml\"");
        std::fs::write(tool.dir.path().join("catalog.xml"), catalog).unwrap();
        tool
    }

    /// Where scripts can record their process id with `echo $$ > "$PIDFILE"`
    pub fn pid_file(&self) -> PathBuf {
        self.dir.path().join("tool.pid")
    }

    /// Shell prelude exporting `PIDFILE` next to the script
    pub fn pid_prelude() -> &'static str {
        "PIDFILE=\"$(dirname \"$0\")/tool.pid\"\necho $$ > \"$PIDFILE\""
    }

    pub async fn wait_for_pid(&self) -> u32 {
        let pid_file = self.pid_file();
        for _ in 0..200 {
            if let Ok(raw) = std::fs::read_to_string(&pid_file) {
                if let Ok(pid) = raw.trim().parse() {
                    return pid;
                }
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
        panic!("tool never wrote {}", pid_file.display());
    }
}

/// Whether a process with `pid` still exists
pub fn process_alive(pid: u32) -> bool {
    std::process::Command::new("kill")
        .args(["-0", &pid.to_string()])
        .stderr(std::process::Stdio::null())
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}

/// Poll until `pid` is gone or `limit` passes
pub async fn wait_for_exit(pid: u32, limit: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + limit;
    while tokio::time::Instant::now() < deadline {
        if !process_alive(pid) {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    !process_alive(pid)
}

/// XML listing with one table per entry of `counts`, each holding that many
/// tags, in the layout the real tool uses
pub fn synthetic_catalog(counts: &[usize]) -> String {
    let mut xml = String::from("<?xml version='1.0' encoding='UTF-8'?>\n<taginfo>\n");
    for (t, count) in counts.iter().enumerate() {
        xml.push_str(&format!("<table name='Group{t}' g0='Group{t}'>\n"));
        xml.push_str(&format!(" <desc lang='en'>Group {t}</desc>\n"));
        for g in 0..*count {
            xml.push_str(&format!(
                " <tag id='{g}' name='Tag{g}' type='int16u' writable='{}'>\n  <desc lang='en'>Tag {g}</desc>\n  <desc lang='de'>Etikett {g}</desc>\n </tag>\n",
                g % 2 == 0
            ));
        }
        xml.push_str("</table>\n");
    }
    xml.push_str("</taginfo>\n");
    xml
}

/// Expected `path` values for `synthetic_catalog(counts)`, in order
pub fn expected_paths(counts: &[usize]) -> Vec<String> {
    counts
        .iter()
        .enumerate()
        .flat_map(|(t, count)| (0..*count).map(move |g| format!("Group{t}:Tag{g}")))
        .collect()
}

pub struct TestServer {
    pub address: SocketAddr,
    pub shutdown: CancellationToken,
    pub handle: JoinHandle<Result<(), ServerError>>,
}

impl TestServer {
    pub async fn start(tool: &FakeTool, grace: Duration) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        let mut config = ServerConfig::new(address, tool.path.clone());
        config.shutdown_grace = grace;

        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(serve_with_shutdown(listener, config, shutdown.clone()));
        Self {
            address,
            shutdown,
            handle,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.address, path)
    }

    pub async fn stop(self) {
        self.shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(10), self.handle)
            .await
            .expect("server did not stop")
            .unwrap()
            .unwrap();
    }
}
