//! Test server management: spawns and supervises ironbncd instances.

use std::io::Write as _;
use std::process::{Child, Command, Stdio};
use std::time::Duration;

use tempfile::TempDir;
use tokio::net::TcpStream;
use tokio::time::sleep;

/// Staging area for a server about to be spawned: write accounts here,
/// then call [`ServerSetup::spawn`].
pub struct ServerSetup {
    dir: TempDir,
    port: u16,
}

impl ServerSetup {
    /// Create the data directory and process config.
    pub fn prepare(port: u16, interval: u64) -> anyhow::Result<ServerSetup> {
        let dir = TempDir::new()?;
        let config = format!(
            r#"
[server]
listen = "127.0.0.1:{port}"
data_dir = "{data_dir}"

[system]
interval = {interval}
"#,
            data_dir = dir.path().display(),
        );
        std::fs::write(dir.path().join("ironbnc.toml"), config)?;
        std::fs::create_dir_all(dir.path().join("users"))?;
        Ok(ServerSetup { dir, port })
    }

    /// Write one account's property file.
    pub fn add_user(&self, name: &str, entries: &[(&str, &str)]) -> anyhow::Result<()> {
        let path = self.dir.path().join("users").join(format!("{name}.conf"));
        let mut file = std::fs::File::create(path)?;
        for (key, value) in entries {
            writeln!(file, "{key}={value}")?;
        }
        Ok(())
    }

    /// Start the daemon and wait for the listener to come up.
    pub async fn spawn(self) -> anyhow::Result<TestServer> {
        let child = Command::new(env!("CARGO_BIN_EXE_ironbncd"))
            .arg(self.dir.path().join("ironbnc.toml"))
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()?;

        let server = TestServer {
            child,
            port: self.port,
            _dir: self.dir,
        };

        for _ in 0..100 {
            if TcpStream::connect(server.address()).await.is_ok() {
                return Ok(server);
            }
            sleep(Duration::from_millis(50)).await;
        }
        anyhow::bail!("server did not start listening on port {}", server.port)
    }
}

/// A running ironbncd instance, killed on drop.
pub struct TestServer {
    child: Child,
    port: u16,
    _dir: TempDir,
}

impl TestServer {
    pub fn address(&self) -> String {
        format!("127.0.0.1:{}", self.port)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}
