use anyhow::{Context, Result, bail};
use tokio::{
    io::{self, AsyncBufRead, AsyncBufReadExt, AsyncWriteExt, BufReader},
    net::{
        TcpStream,
        tcp::{OwnedReadHalf, OwnedWriteHalf},
    },
    select,
};
use tracing::{info, warn};

use crate::{
    cli::ClientArgs,
    event::{ClientEvent, ServerEvent, read_message, write_message},
    roster::normalize_name,
};

/// A parsed line of terminal input.
#[derive(Debug, PartialEq, Eq)]
pub enum Input {
    Quit,
    Broadcast(String),
    Whisper {
        recipients: Vec<String>,
        body: String,
    },
    Skip,
}

impl Input {
    /// `/quit` leaves and `/w alice, bob text` whispers; both commands are
    /// case-insensitive. Recipients are separated by commas, with optional
    /// spaces after each comma, and the body starts at the first word not
    /// preceded by a comma. Anything else is said to the whole room.
    pub fn parse(line: &str) -> Self {
        let text = line.trim_end();
        if text.trim().is_empty() {
            return Input::Skip;
        }
        if text.eq_ignore_ascii_case("/quit") {
            return Input::Quit;
        }

        if let Some(rest) = strip_command(text, "/w ") {
            let (recipients, body) = split_recipients(rest);
            if recipients.is_empty() || body.trim().is_empty() {
                return Input::Skip;
            }
            return Input::Whisper {
                recipients,
                body: body.to_string(),
            };
        }

        Input::Broadcast(text.to_string())
    }
}

fn strip_command<'a>(text: &'a str, command: &str) -> Option<&'a str> {
    let head = text.get(..command.len())?;
    if !head.eq_ignore_ascii_case(command) {
        return None;
    }
    Some(&text[command.len()..])
}

fn split_recipients(rest: &str) -> (Vec<String>, &str) {
    let mut recipients = Vec::new();
    let mut remaining = rest.trim_start();

    loop {
        let (token, after) = remaining
            .split_once(char::is_whitespace)
            .unwrap_or((remaining, ""));
        let names = token
            .split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string);
        recipients.extend(names);
        remaining = after.trim_start();

        if !token.ends_with(',') || remaining.is_empty() {
            return (recipients, remaining);
        }
    }
}

pub async fn run(args: ClientArgs) -> Result<()> {
    let (mut reader, mut writer) = establish_connection(&args).await?;
    register(&mut reader, &mut writer, &args.name).await?;

    let mut stdin = BufReader::new(tokio::io::stdin());
    let mut input = String::new();

    run_client_loop(&mut reader, &mut writer, &mut stdin, &mut input).await?;
    shutdown_connection(&mut writer).await;

    Ok(())
}

async fn establish_connection(
    args: &ClientArgs,
) -> Result<(BufReader<OwnedReadHalf>, OwnedWriteHalf)> {
    let stream = TcpStream::connect(args.server)
        .await
        .with_context(|| format!("failed to connect to {}", args.server))?;

    info!("connected to {}", args.server);

    let (reader, writer) = stream.into_split();
    Ok((BufReader::new(reader), writer))
}

/// Sends the registration and prints whatever arrives until the room
/// answers it.
async fn register<R>(reader: &mut R, writer: &mut OwnedWriteHalf, name: &str) -> Result<()>
where
    R: AsyncBufRead + Unpin,
{
    write_message(
        writer,
        &ClientEvent::Register {
            name: name.to_string(),
        },
    )
    .await?;

    loop {
        match read_message::<_, ServerEvent>(reader).await? {
            Some(ServerEvent::RegisterResult { ok: true }) => {
                let banner = format!("*** connected as {}", normalize_name(name));
                write_stdout(&banner).await?;
                return Ok(());
            }
            Some(ServerEvent::RegisterResult { ok: false }) => {
                let warning = format!("!!! name '{name}' was rejected");
                write_stderr(&warning).await?;
                bail!("name '{name}' was rejected");
            }
            Some(other) => render_server_event(other).await?,
            None => bail!("server closed the connection before registration finished"),
        }
    }
}

async fn run_client_loop(
    reader: &mut BufReader<OwnedReadHalf>,
    writer: &mut OwnedWriteHalf,
    stdin: &mut BufReader<tokio::io::Stdin>,
    input: &mut String,
) -> Result<()> {
    loop {
        input.clear();
        select! {
            server_event = read_message::<_, ServerEvent>(reader) => {
                if !handle_server_event(server_event).await? {
                    break;
                }
            }
            bytes_read = stdin.read_line(input) => {
                if !handle_stdin_input(bytes_read, input, writer).await? {
                    break;
                }
            }
            ctrl_c = tokio::signal::ctrl_c() => {
                handle_ctrl_c(ctrl_c);
                break;
            }
        }
    }
    Ok(())
}

async fn handle_server_event(event: io::Result<Option<ServerEvent>>) -> Result<bool> {
    match event? {
        Some(event) => {
            render_server_event(event).await?;
            Ok(true)
        }
        None => {
            write_stdout("*** server closed the connection").await?;
            Ok(false)
        }
    }
}

async fn handle_stdin_input(
    bytes_read: io::Result<usize>,
    input: &str,
    writer: &mut OwnedWriteHalf,
) -> Result<bool> {
    if bytes_read? == 0 {
        return Ok(false);
    }

    let event = match Input::parse(input) {
        Input::Skip => return Ok(true),
        Input::Quit => {
            write_stdout("*** leaving chat").await?;
            return Ok(false);
        }
        Input::Broadcast(body) => ClientEvent::Chat {
            body,
            recipients: Vec::new(),
        },
        Input::Whisper { recipients, body } => ClientEvent::Chat { body, recipients },
    };

    write_message(writer, &event).await?;
    Ok(true)
}

fn handle_ctrl_c(result: io::Result<()>) {
    if let Err(error) = result {
        warn!(?error, "ctrl-c handler failed");
    }
}

async fn shutdown_connection(writer: &mut OwnedWriteHalf) {
    if let Err(error) = writer.shutdown().await {
        warn!(?error, "failed to shutdown client writer cleanly");
    }
}

async fn render_server_event(event: ServerEvent) -> io::Result<()> {
    match event {
        ServerEvent::ChatMessage { text } => write_stdout(&text).await,
        ServerEvent::RosterUpdate { names } => {
            let listing = format!("*** online: {}", names.join(", "));
            write_stdout(&listing).await
        }
        ServerEvent::RegisterResult { ok } => {
            let warning = format!("!!! unexpected registration result: {ok}");
            write_stderr(&warning).await
        }
    }
}

async fn write_stdout(line: &str) -> io::Result<()> {
    let mut stdout = tokio::io::stdout();
    stdout.write_all(line.as_bytes()).await?;
    stdout.write_all(b"\n").await?;
    stdout.flush().await
}

async fn write_stderr(line: &str) -> io::Result<()> {
    let mut stderr = tokio::io::stderr();
    stderr.write_all(line.as_bytes()).await?;
    stderr.write_all(b"\n").await?;
    stderr.flush().await
}
