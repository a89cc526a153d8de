//! TCP front end: one thread per client connection.

use std::io::{BufRead, BufReader, BufWriter, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::thread::JoinHandle;

use anyhow::{Context, Result};

use crate::protocol::{self, Request, Response};
use crate::session::Session;

/// Accept clients on `listener` in a background thread.
pub fn spawn_server(listener: TcpListener, session: Arc<Session>) -> Result<JoinHandle<()>> {
    let addr = listener.local_addr().context("listener address")?;
    tracing::info!(bind = %addr, "accepting clients");
    let join = std::thread::Builder::new()
        .name("tonearmd-accept".into())
        .spawn(move || accept_loop(listener, session))
        .context("spawn accept thread")?;
    Ok(join)
}

fn accept_loop(listener: TcpListener, session: Arc<Session>) {
    for conn in listener.incoming() {
        let stream = match conn {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!("accept failed: {e}");
                continue;
            }
        };
        let peer = stream
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "unknown".into());
        let session = session.clone();
        std::thread::spawn(move || {
            tracing::info!(peer = %peer, "client connected");
            match serve_client(stream, &session) {
                Ok(()) => tracing::info!(peer = %peer, "client disconnected"),
                Err(e) => tracing::warn!(peer = %peer, "client error: {e:#}"),
            }
        });
    }
}

/// Run the protocol on one connection until `quit` or EOF.
pub fn serve_client(stream: TcpStream, session: &Session) -> Result<()> {
    let reader = BufReader::new(stream.try_clone().context("clone client stream")?);
    let mut out = BufWriter::new(stream);
    send(&mut out, &session.greeting())?;

    for line in reader.lines() {
        let line = line.context("read request")?;
        let (response, quit) = match protocol::parse(&line) {
            Ok(None) => continue,
            Ok(Some(req)) => {
                tracing::debug!(?req, "request");
                let quit = req == Request::Quit;
                (session.handle(req), quit)
            }
            Err(e) => (Response::err(e), false),
        };
        send(&mut out, &response)?;
        if quit {
            break;
        }
    }
    Ok(())
}

fn send(out: &mut impl Write, response: &Response) -> Result<()> {
    out.write_all(response.render().as_bytes())
        .context("write response")?;
    out.flush().context("flush response")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use std::net::Shutdown;

    use crate::test_support::session;

    #[test]
    fn client_conversation_over_tcp() {
        let dir = tempfile::tempdir().unwrap();
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        spawn_server(listener, Arc::new(session(dir.path()))).unwrap();

        let mut client = TcpStream::connect(addr).unwrap();
        client
            .write_all(b"ping\n\naddplaylist \"late night\"\nbogus\nquit\n")
            .unwrap();
        client.shutdown(Shutdown::Write).unwrap();
        let mut reply = String::new();
        client.read_to_string(&mut reply).unwrap();

        let version = crate::cli::VERSION;
        assert_eq!(
            reply,
            format!(
                "tonearmd {version}\nOK\n\n\
                 OK\n\n\
                 OK\n\n\
                 ERR unknown command \"bogus\"\n\n\
                 Bye.\nOK\n\n"
            )
        );
    }
}
