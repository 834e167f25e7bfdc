use crate::error::{Error, Result};
use crate::protocol::{EventCode, FRAME_LEN};
use log::{debug, info, warn};
use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{lookup_host, TcpListener, TcpStream};
use tokio::sync::mpsc;

/// Which end of the link this writer is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkRole {
    Server,
    Client,
}

/// How the writer gets hold of its peer.
#[derive(Debug)]
pub enum PeerSource {
    /// Bind this port and wait for one connection.
    Listen(u16),
    /// An already bound listener; lets callers pick an ephemeral port.
    Listener(TcpListener),
    /// Connect to `host:port`.
    Dial { host: String, port: u16 },
}

impl PeerSource {
    pub fn role(&self) -> LinkRole {
        match self {
            PeerSource::Listen(_) | PeerSource::Listener(_) => LinkRole::Server,
            PeerSource::Dial { .. } => LinkRole::Client,
        }
    }

    /// Blocks until the single peer is connected.
    pub async fn establish(self) -> Result<NetworkLink> {
        match self {
            PeerSource::Listen(port) => {
                let listener = TcpListener::bind((Ipv4Addr::UNSPECIFIED, port))
                    .await
                    .map_err(|e| Error::io("binding listener", e))?;
                accept(listener).await
            }
            PeerSource::Listener(listener) => accept(listener).await,
            PeerSource::Dial { host, port } => connect(&host, port).await,
        }
    }
}

async fn accept(listener: TcpListener) -> Result<NetworkLink> {
    let local = listener
        .local_addr()
        .map_err(|e| Error::io("binding listener", e))?;
    info!("waiting for a peer on {local}");
    let (stream, peer) = listener
        .accept()
        .await
        .map_err(|e| Error::io("accepting peer", e))?;
    info!("peer connected from {peer}");
    NetworkLink::new(stream, peer)
}

async fn connect(host: &str, port: u16) -> Result<NetworkLink> {
    let addr = resolve(host, port).await?;
    info!("connecting to {addr}");
    let stream = TcpStream::connect(addr)
        .await
        .map_err(|e| Error::io("connecting to peer", e))?;
    NetworkLink::new(stream, addr)
}

/// `localhost` is taken literally as the loopback address, everything else goes through the
/// resolver.
pub async fn resolve(host: &str, port: u16) -> Result<SocketAddr> {
    if host == "localhost" {
        return Ok(SocketAddr::from((Ipv4Addr::LOCALHOST, port)));
    }
    lookup_host((host, port))
        .await
        .map_err(|e| Error::io("resolving peer", e))?
        .next()
        .ok_or_else(|| {
            Error::io(
                "resolving peer",
                io::Error::new(io::ErrorKind::NotFound, format!("no address for {host}")),
            )
        })
}

/// A connected stream to the one peer.
pub struct NetworkLink {
    stream: TcpStream,
    peer: SocketAddr,
}

impl NetworkLink {
    fn new(stream: TcpStream, peer: SocketAddr) -> Result<Self> {
        stream
            .set_nodelay(true)
            .map_err(|e| Error::io("configuring link", e))?;
        Ok(Self { stream, peer })
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Splits the link into a sender and a channel of incoming events fed by a reader task.
    /// The channel closes when the peer hangs up.
    pub fn split(self) -> (LinkSender, mpsc::Receiver<Result<EventCode>>) {
        let (read, write) = self.stream.into_split();
        let (tx, rx) = mpsc::channel(64);
        tokio::spawn(read_events(read, tx));
        (
            LinkSender {
                half: write,
                peer: self.peer,
            },
            rx,
        )
    }
}

/// Fills `frame` from `reader`. Returns how many bytes arrived before end of stream, which is
/// `FRAME_LEN` for a whole frame.
async fn read_frame<R: AsyncRead + Unpin>(
    reader: &mut R,
    frame: &mut [u8; FRAME_LEN],
) -> io::Result<usize> {
    let mut filled = 0;
    while filled < FRAME_LEN {
        match reader.read(&mut frame[filled..]).await? {
            0 => break,
            n => filled += n,
        }
    }
    Ok(filled)
}

async fn read_events(mut half: OwnedReadHalf, events: mpsc::Sender<Result<EventCode>>) {
    let mut frame = [0u8; FRAME_LEN];
    loop {
        match read_frame(&mut half, &mut frame).await {
            Ok(FRAME_LEN) => {
                let code = EventCode::decode(&frame);
                debug!("received {code:?}");
                if events.send(Ok(code)).await.is_err() {
                    return;
                }
            }
            Ok(0) => {
                info!("peer closed the link");
                return;
            }
            Ok(partial) => {
                warn!(
                    "peer closed the link mid frame, dropping {:?}",
                    &frame[..partial]
                );
                return;
            }
            Err(e) => {
                warn!("link read failed: {e}");
                let _ = events.send(Err(Error::io("reading from peer", e))).await;
                return;
            }
        }
    }
}

/// Write side of the link.
pub struct LinkSender {
    half: OwnedWriteHalf,
    peer: SocketAddr,
}

impl LinkSender {
    pub async fn send(&mut self, code: EventCode) -> Result<()> {
        self.half
            .write_all(&code.encode())
            .await
            .map_err(|e| Error::io("writing to peer", e))?;
        debug!("sent {code:?} to {}", self.peer);
        Ok(())
    }

    pub async fn close(mut self) -> Result<()> {
        self.half
            .shutdown()
            .await
            .map_err(|e| Error::io("closing link", e))
    }
}
