use std::{path::Path, process::Stdio, time::Duration};

use anyhow::{Context, Result, anyhow};
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    process::{Child, ChildStdin, ChildStdout, Command},
    time::timeout,
};

const READ_TIMEOUT: Duration = Duration::from_secs(3);

#[tokio::test]
async fn cli_chat_end_to_end() -> Result<()> {
    let binary = assert_cmd::cargo::cargo_bin!("whisper-room");

    let (mut broker_child, mut broker_stdout) = spawn_broker(&binary).await?;
    let addr = read_broker_addr(&mut broker_stdout).await?;

    // Drain additional broker logs in the background so the pipe never fills.
    let broker_log_task = tokio::spawn(async move {
        drain_stdout(broker_stdout).await;
    });

    let mut alice = spawn_client(&binary, "alice", &addr).await?;
    expect_line(&mut alice.stdout, "*** online: alice").await?;

    let mut bob = spawn_client(&binary, "bob", &addr).await?;
    expect_line(&mut bob.stdout, "*** online: alice, bob").await?;
    expect_prefix(&mut alice.stdout, "bob entered the chatroom (").await?;
    expect_line(&mut alice.stdout, "*** online: alice, bob").await?;

    // Broadcasts reach both participants, the sender included.
    alice
        .send_line("Hello from Alice")
        .await
        .context("alice send line")?;
    expect_prefix(&mut bob.stdout, "alice : Hello from Alice (").await?;
    expect_prefix(&mut alice.stdout, "alice : Hello from Alice (").await?;

    // Whispers reach only the named recipient; the sender gets a confirmation.
    bob.send_line("/w alice,ghost just for you")
        .await
        .context("bob send whisper")?;
    expect_line(&mut alice.stdout, "bob whispers to you : just for you").await?;
    expect_line(&mut bob.stdout, "You whisper to alice : just for you").await?;

    // Alice quits; Bob sees her leave and the shrunken roster.
    alice.send_line("/quit").await.context("alice send quit")?;
    expect_line(&mut alice.stdout, "*** leaving chat").await?;
    expect_prefix(&mut bob.stdout, "alice left the chatroom (").await?;
    expect_line(&mut bob.stdout, "*** online: bob").await?;

    bob.send_line("/quit").await.context("bob send quit")?;
    expect_line(&mut bob.stdout, "*** leaving chat").await?;

    ensure_success(&mut alice.child, "alice client").await?;
    ensure_success(&mut bob.child, "bob client").await?;

    // The broker keeps running after clients leave; terminate it manually.
    let _ = broker_child.kill().await;
    let _ = broker_child.wait().await;
    let _ = broker_log_task.await;

    Ok(())
}

#[tokio::test]
async fn cli_rejects_taken_name() -> Result<()> {
    let binary = assert_cmd::cargo::cargo_bin!("whisper-room");

    let (mut broker_child, mut broker_stdout) = spawn_broker(&binary).await?;
    let addr = read_broker_addr(&mut broker_stdout).await?;
    let broker_log_task = tokio::spawn(async move {
        drain_stdout(broker_stdout).await;
    });

    let mut first = spawn_client(&binary, "dup", &addr).await?;

    let mut second = Command::new(&binary)
        .arg("client")
        .arg("--name")
        .arg("dup")
        .arg("--server")
        .arg(&addr)
        .env("RUST_LOG", "off")
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .context("failed to spawn second client")?;
    let status = timeout(READ_TIMEOUT, second.wait()).await??;
    assert!(!status.success(), "second client should fail to register");

    first.send_line("/quit").await?;
    let _ = first.child.wait().await;
    let _ = broker_child.kill().await;
    let _ = broker_child.wait().await;
    let _ = broker_log_task.await;

    Ok(())
}

struct ClientProcess {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

impl ClientProcess {
    async fn send_line(&mut self, line: &str) -> Result<()> {
        self.stdin
            .write_all(line.as_bytes())
            .await
            .with_context(|| format!("failed to send line '{line}'"))?;
        self.stdin.write_all(b"\n").await?;
        self.stdin.flush().await?;
        Ok(())
    }
}

async fn spawn_broker(binary: &Path) -> Result<(Child, BufReader<ChildStdout>)> {
    let mut cmd = Command::new(binary);
    cmd.arg("broker")
        .arg("--listen")
        .arg("127.0.0.1:0")
        .env("RUST_LOG", "info")
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true);

    let mut child = cmd.spawn().context("failed to spawn broker")?;
    let stdout = child
        .stdout
        .take()
        .context("broker stdout missing after spawn")?;

    Ok((child, BufReader::new(stdout)))
}

async fn read_broker_addr(reader: &mut BufReader<ChildStdout>) -> Result<String> {
    let line = read_line(reader)
        .await?
        .context("broker did not emit listening address")?;
    let trimmed = line.trim();
    let addr = trimmed
        .split_whitespace()
        .last()
        .context("unexpected broker banner format")?;
    if !addr.contains(':') {
        return Err(anyhow!("broker banner missing socket: {trimmed}"));
    }
    Ok(addr.to_string())
}

/// Spawns a client and waits until its registration has been accepted.
async fn spawn_client(binary: &Path, name: &str, addr: &str) -> Result<ClientProcess> {
    let mut cmd = Command::new(binary);
    cmd.arg("client")
        .arg("--name")
        .arg(name)
        .arg("--server")
        .arg(addr)
        .env("RUST_LOG", "warn")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true);

    let mut child = cmd
        .spawn()
        .with_context(|| format!("failed to spawn client {name}"))?;

    let stdin = child
        .stdin
        .take()
        .context("client stdin missing after spawn")?;
    let stdout = child
        .stdout
        .take()
        .context("client stdout missing after spawn")?;

    let mut process = ClientProcess {
        child,
        stdin,
        stdout: BufReader::new(stdout),
    };

    let joined = format!("{name} entered the chatroom (");
    expect_prefix(&mut process.stdout, &joined).await?;
    let banner = format!("*** connected as {name}");
    expect_line(&mut process.stdout, &banner).await?;

    Ok(process)
}

async fn expect_line(reader: &mut BufReader<ChildStdout>, expected: &str) -> Result<()> {
    let line = read_line_expect(reader, expected).await?;
    if line != expected {
        return Err(anyhow!("expected '{expected}', got '{line}'"));
    }
    Ok(())
}

async fn expect_prefix(reader: &mut BufReader<ChildStdout>, prefix: &str) -> Result<()> {
    let line = read_line_expect(reader, prefix).await?;
    if !line.starts_with(prefix) {
        return Err(anyhow!(
            "expected a line starting with '{prefix}', got '{line}'"
        ));
    }
    Ok(())
}

async fn read_line_expect(
    reader: &mut BufReader<ChildStdout>,
    description: &str,
) -> Result<String> {
    match read_line(reader).await {
        Ok(Some(line)) => Ok(line),
        Ok(None) => Err(anyhow!("waiting for '{description}': stream closed")),
        Err(err) => Err(err.context(format!("waiting for '{description}'"))),
    }
}

async fn read_line(reader: &mut BufReader<ChildStdout>) -> Result<Option<String>> {
    let mut line = String::new();
    let read_future = reader.read_line(&mut line);
    let bytes_io = match timeout(READ_TIMEOUT, read_future).await {
        Ok(result) => result,
        Err(_) => return Err(anyhow!("timed out waiting for line")),
    };
    let byte_count = bytes_io?;
    if byte_count == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim_end_matches(['\r', '\n']).to_string()))
}

async fn drain_stdout(mut reader: BufReader<ChildStdout>) {
    let mut buffer = String::new();
    while reader
        .read_line(&mut buffer)
        .await
        .map(|bytes| {
            let has_data = bytes > 0;
            if has_data {
                buffer.clear();
            }
            has_data
        })
        .unwrap_or(false)
    {}
}

async fn ensure_success(child: &mut Child, name: &str) -> Result<()> {
    let status = child
        .wait()
        .await
        .with_context(|| format!("failed to await {name} process"))?;
    if !status.success() {
        return Err(anyhow!("{name} exited with status {status}"));
    }
    Ok(())
}
