//! Interactive chat session over WebSocket.

use crate::view::{ChatView, Input, Outgoing};
use anyhow::{Context, Result};
use futures_util::{Sink, SinkExt, StreamExt};
use relay_core::{ClientEvent, Identity, ServerEvent};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info};

/// Connect, announce `name`, and pump stdin/server events until either side ends.
pub async fn run(host: &str, port: u16, name: Identity, admin: Identity) -> Result<()> {
    let url = format!("ws://{host}:{port}");
    let (ws, _) = connect_async(&url)
        .await
        .with_context(|| format!("failed to connect to {url}"))?;
    info!(url = %url, "connected");

    let (mut sink, mut stream) = ws.split();
    let mut view = ChatView::new(name.clone(), admin);

    send(&mut sink, &ClientEvent::IdentityAnnounced { identity: name.clone() }).await?;
    println!("connected as {name}{}", if view.is_admin() { " (admin)" } else { "" });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("failed to read stdin")? else {
                    break;
                };
                match Input::parse(&line) {
                    Input::Empty => {}
                    Input::Quit => break,
                    Input::Usage(usage) => println!("* usage: {usage}"),
                    Input::Who => {
                        for row in view.rows() {
                            let mark = if row.online { "●" } else { " " };
                            let sel = if row.selected { " <" } else { "" };
                            println!("{mark} {}{sel}", row.identity);
                        }
                    }
                    Input::Select(who) => match Identity::new(who) {
                        Ok(who) if view.is_admin() => {
                            println!("* now writing to {who}");
                            view.select(who);
                        }
                        Ok(_) => println!("* only the admin picks a recipient"),
                        Err(e) => println!("! {e}"),
                    },
                    Input::Text(text) => match view.outgoing(text) {
                        Outgoing::Send(msg) => {
                            send(&mut sink, &ClientEvent::PrivateMessage(msg)).await?;
                        }
                        Outgoing::NeedRecipient => {
                            println!("* select a user with /to <name> first");
                        }
                    },
                }
            }

            msg = stream.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<ServerEvent>(&text) {
                            Ok(event) => {
                                if let Some(out) = view.apply(event) {
                                    println!("{out}");
                                }
                            }
                            Err(e) => debug!(error = %e, "ignoring undecodable event"),
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        println!("* disconnected");
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return Err(anyhow::Error::new(e).context("connection failed")),
                }
            }
        }
    }

    let _ = sink.send(Message::Close(None)).await;
    Ok(())
}

async fn send<S>(sink: &mut S, event: &ClientEvent) -> Result<()>
where
    S: Sink<Message> + Unpin,
    S::Error: std::error::Error + Send + Sync + 'static,
{
    let text = serde_json::to_string(event).context("failed to encode event")?;
    sink.send(Message::Text(text)).await.context("failed to send")?;
    Ok(())
}
