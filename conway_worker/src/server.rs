use std::io;

use conway::rpc::{self, Request, Response};
use conway::{Error, StepFunction};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::service::ControlService;

/// Accepts controllers until the listener fails. Each connection is served
/// on its own task.
pub async fn serve<S>(listener: TcpListener, service: ControlService<S>) -> io::Result<()>
where
    S: StepFunction + 'static,
{
    loop {
        let (stream, peer) = listener.accept().await?;
        info!(%peer, "controller connected");
        let service = service.clone();
        tokio::spawn(async move {
            if let Err(err) = serve_connection(stream, service).await {
                warn!(%peer, "connection ended with error: {err}");
            }
            info!(%peer, "controller disconnected");
        });
    }
}

/// Reads requests off one connection. Each call is started in arrival order
/// and answered on its own task, so a running `ComputeTurns` never holds up
/// the calls behind it.
pub async fn serve_connection<S>(stream: TcpStream, service: ControlService<S>) -> Result<(), Error>
where
    S: StepFunction + 'static,
{
    stream.set_nodelay(true)?;
    let (read_half, mut write_half) = stream.into_split();
    let (responses, mut outgoing) = mpsc::unbounded_channel::<Response>();

    let writer = tokio::spawn(async move {
        while let Some(response) = outgoing.recv().await {
            if let Err(err) = rpc::write_frame(&mut write_half, &response).await {
                warn!(id = response.id, "failed to send response: {err}");
                break;
            }
        }
    });

    let mut lines = BufReader::new(read_half).lines();
    while let Some(line) = lines.next_line().await? {
        let request: Request = match rpc::parse_frame(&line) {
            Ok(request) => request,
            Err(err) => {
                // Without a readable id the reply can only go to id 0
                warn!("rejecting request: {err}");
                let _ = responses.send(Response::from_result(0, Err(err)));
                continue;
            }
        };

        let Request {
            id,
            method,
            message,
        } = request;
        // The ordered part runs before the next line is read
        let call = service.begin(method, &message);
        let responses = responses.clone();
        tokio::spawn(async move {
            let result = call.complete().await;
            if let Err(err) = &result {
                debug!(id, ?method, "call failed: {err}");
            }
            let _ = responses.send(Response::from_result(id, result));
        });
    }

    // Calls still running finish and reply before the writer exits
    drop(responses);
    let _ = writer.await;
    Ok(())
}
