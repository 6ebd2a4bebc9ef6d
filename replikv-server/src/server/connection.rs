use crate::core::{Result, ServerError};
use crate::protocol::{Frame, RespCodec, Request};
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio_util::codec::Framed;
use tracing::debug;

/// Any byte stream a connection can run over (TCP, or an in-memory duplex in tests)
pub trait Transport: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> Transport for T {}

/// A framed RESP connection.
///
/// Used on both sides: the server reads requests and writes replies, the
/// replica client and the CLI write requests and read replies.
pub struct Connection {
    framed: Framed<Box<dyn Transport>, RespCodec>,
    peer: Option<SocketAddr>,
}

impl Connection {
    pub fn new(transport: impl Transport + 'static, peer: Option<SocketAddr>) -> Self {
        Self {
            framed: Framed::new(Box::new(transport), RespCodec::new()),
            peer,
        }
    }

    /// Open an outbound TCP connection
    pub async fn connect(addr: impl ToSocketAddrs) -> Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        let peer = stream.peer_addr().ok();
        if let Err(e) = stream.set_nodelay(true) {
            debug!("set_nodelay failed for {:?}: {}", peer, e);
        }
        Ok(Self::new(stream, peer))
    }

    pub fn peer(&self) -> Option<SocketAddr> {
        self.peer
    }

    /// Next frame, or `None` once the peer has closed the stream
    pub async fn read_frame(&mut self) -> Result<Option<Frame>> {
        match self.framed.next().await {
            Some(Ok(frame)) => Ok(Some(frame)),
            Some(Err(e)) => Err(e.into()),
            None => Ok(None),
        }
    }

    /// Next request, or `None` once the peer has closed the stream
    pub async fn read_request(&mut self) -> Result<Option<Request>> {
        match self.read_frame().await? {
            Some(frame) => Ok(Some(Request::try_from(frame)?)),
            None => Ok(None),
        }
    }

    /// Write one frame and flush it
    pub async fn write_frame(&mut self, frame: Frame) -> Result<()> {
        self.framed.send(frame).await.map_err(ServerError::from)
    }

    /// `+<status>`
    pub async fn write_status(&mut self, status: &str) -> Result<()> {
        self.write_frame(Frame::Simple(status.to_string())).await
    }

    /// `-<message>`
    pub async fn write_error(&mut self, message: impl Into<String>) -> Result<()> {
        self.write_frame(Frame::Error(message.into())).await
    }

    /// Bulk value, or nil for `None`
    pub async fn write_bulk(&mut self, value: Option<Bytes>) -> Result<()> {
        let frame = match value {
            Some(v) => Frame::Bulk(v),
            None => Frame::Null,
        };
        self.write_frame(frame).await
    }

    /// Ordered multi-value reply of bulk strings
    pub async fn write_multi(&mut self, values: Vec<Bytes>) -> Result<()> {
        self.write_frame(Frame::bulk_array(values)).await
    }

    pub async fn send_request(&mut self, request: Request) -> Result<()> {
        self.write_frame(request.into_frame()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_request_reply_over_duplex() {
        let (client_io, server_io) = tokio::io::duplex(1024);
        let mut client = Connection::new(client_io, None);
        let mut server = Connection::new(server_io, None);

        client
            .send_request(Request::new("GET", ["key"]))
            .await
            .unwrap();
        let request = server.read_request().await.unwrap().unwrap();
        assert_eq!(request, Request::new("GET", ["key"]));

        server.write_bulk(None).await.unwrap();
        server
            .write_multi(vec![Bytes::from("put"), Bytes::from("k")])
            .await
            .unwrap();

        assert_eq!(client.read_frame().await.unwrap(), Some(Frame::Null));
        assert_eq!(
            client.read_frame().await.unwrap(),
            Some(Frame::bulk_array(["put", "k"]))
        );

        drop(server);
        assert_eq!(client.read_frame().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_connect_over_tcp() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let accept = tokio::spawn(async move { listener.accept().await.unwrap().0 });

        let conn = Connection::connect(addr).await.unwrap();
        assert_eq!(conn.peer(), Some(addr));

        let stream = accept.await.unwrap();
        let mut server = Connection::new(stream, None);
        drop(conn);
        assert_eq!(server.read_frame().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_wire_bytes() {
        let mock = tokio_test::io::Builder::new()
            .write(b"*2\r\n$4\r\nsync\r\n$1\r\n0\r\n")
            .read(b"*3\r\n$3\r\nput\r\n$1\r\na\r\n$1\r\n1\r\n")
            .write(b"-FAILED\r\n")
            .build();
        let mut conn = Connection::new(mock, None);

        conn.send_request(Request::new("sync", ["0"])).await.unwrap();
        assert_eq!(
            conn.read_frame().await.unwrap(),
            Some(Frame::bulk_array(["put", "a", "1"]))
        );
        conn.write_error("FAILED").await.unwrap();
    }
}
