use std::net::SocketAddr;
use std::sync::Arc;

use rpcpool_common::protocol::error::Result;
use rpcpool_common::protocol::{ActorReply, DispatchRecord};
use rpcpool_common::transport::{framed, TcpServer};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::actor_pool::{ActorHandle, RemoteActor};
use crate::dispatch::DispatchServer;

/// Accepts actor connections until the listener fails.
pub async fn run_actor_listener(listener: TcpServer, server: Arc<DispatchServer>) -> Result<()> {
    listener
        .run_with_handler(move |stream, peer| serve_actor(server.clone(), stream, peer))
        .await
}

/// Serves one actor socket for its whole lifetime.
///
/// The actor joins the pool as soon as the socket is accepted and leaves it
/// when the socket ends or errors. Dispatch records are written by a
/// dedicated task draining the actor's outbox; replies are read here and
/// routed to whoever is waiting on their `messageSeq`.
pub async fn serve_actor(server: Arc<DispatchServer>, stream: TcpStream, peer: SocketAddr) -> Result<()> {
    let (mut reader, mut writer) = framed(stream);
    let (outbox, mut records) = mpsc::unbounded_channel::<DispatchRecord>();

    let actor_id = server.actors().add(ActorHandle::Remote(RemoteActor::new(peer, outbox)));
    info!(%peer, actors = server.actors().len(), "Actor connected");

    let writer_task = tokio::spawn(async move {
        while let Some(record) = records.recv().await {
            if let Err(e) = writer.send(&record).await {
                warn!(%peer, message_seq = record.message_seq, "Failed to write dispatch record: {}", e);
                break;
            }
        }
    });

    let outcome = read_replies(&server, &mut reader, peer).await;

    server.actors().remove(actor_id);
    writer_task.abort();
    info!(%peer, actors = server.actors().len(), "Actor disconnected");

    outcome
}

async fn read_replies<R>(
    server: &DispatchServer,
    reader: &mut rpcpool_common::transport::FrameReader<R>,
    peer: SocketAddr,
) -> Result<()>
where
    R: tokio::io::AsyncRead + Unpin,
{
    while let Some(batch) = reader.next_batch::<ActorReply>().await? {
        for frame in batch {
            match frame {
                Ok(reply) => {
                    server.complete(reply);
                }
                Err(e) => error!(%peer, "Dropping malformed reply frame: {}", e),
            }
        }
    }
    Ok(())
}
