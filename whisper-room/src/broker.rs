use std::{future::Future, net::SocketAddr, sync::Arc};

use anyhow::Result;
use tokio::{
    io::{AsyncBufRead, AsyncWriteExt, BufReader},
    net::{TcpListener, TcpStream, tcp::OwnedWriteHalf},
    select,
    sync::mpsc,
};
use tracing::{debug, info, warn};

use crate::{
    event::{ClientEvent, ServerEvent, read_message, write_message},
    room::Room,
    session::Session,
};

/// TCP front door for the room, speaking newline-delimited JSON.
pub struct Broker {
    listener: TcpListener,
    room: Arc<Room>,
}

impl Broker {
    pub fn new(listener: TcpListener) -> Self {
        Self::with_room(listener, Arc::new(Room::new()))
    }

    pub fn with_room(listener: TcpListener, room: Arc<Room>) -> Self {
        Self { listener, room }
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send,
    {
        let Broker { listener, room } = self;
        tokio::pin!(shutdown);

        loop {
            select! {
                _ = &mut shutdown => {
                    info!("broker shutting down");
                    break;
                }
                accept_result = listener.accept() => {
                    handle_accept_result(accept_result, &room);
                }
            }
        }

        Ok(())
    }

    pub async fn run_until_ctrl_c(self) -> Result<()> {
        self.run_until(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                warn!(error = ?err, "failed to install ctrl-c handler");
            }
        })
        .await
    }
}

fn handle_accept_result(result: std::io::Result<(TcpStream, SocketAddr)>, room: &Arc<Room>) {
    match result {
        Ok((stream, peer)) => spawn_client_handler(stream, peer, room),
        Err(err) => warn!(error = ?err, "failed to accept connection"),
    }
}

fn spawn_client_handler(stream: TcpStream, peer: SocketAddr, room: &Arc<Room>) {
    let room = Arc::clone(room);
    tokio::spawn(async move {
        if let Err(err) = handle_connection(stream, room).await {
            warn!(peer = %peer, error = ?err, "client connection closed with error");
        }
    });
}

/// Runs one connection to completion. However the read side ends, the
/// session is disconnected from the room before this returns.
async fn handle_connection(stream: TcpStream, room: Arc<Room>) -> Result<()> {
    let peer = stream.peer_addr().ok();
    let (reader, writer) = stream.into_split();
    let mut reader = BufReader::new(reader);

    let (mut session, outbox) = room.connect();
    debug!(?peer, session = %session.id(), "client connected");

    let mut writer_task = tokio::spawn(forward_outbox(outbox, writer));

    let result = select! {
        result = read_events(&room, &mut session, &mut reader) => result,
        _ = &mut writer_task => Ok(()),
    };

    room.disconnect(&mut session).await;
    debug!(?peer, session = %session.id(), "client disconnected");
    // Dropping the last handle closes the outbox; the writer drains and exits.
    drop(session);
    if !writer_task.is_finished() {
        let _ = writer_task.await;
    }

    result
}

async fn read_events<R>(room: &Room, session: &mut Session, reader: &mut R) -> Result<()>
where
    R: AsyncBufRead + Unpin,
{
    while let Some(event) = read_message::<_, ClientEvent>(reader).await? {
        room.handle(session, event).await;
    }
    Ok(())
}

async fn forward_outbox(
    mut outbox: mpsc::UnboundedReceiver<ServerEvent>,
    mut writer: OwnedWriteHalf,
) {
    while let Some(event) = outbox.recv().await {
        if let Err(err) = write_message(&mut writer, &event).await {
            debug!(?err, "failed to deliver event to client");
            return;
        }
    }

    if let Err(err) = writer.shutdown().await {
        debug!(?err, "failed to shut down client writer");
    }
}
