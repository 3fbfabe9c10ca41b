use std::{net::SocketAddr, sync::Arc};

use futures_util::{future, pin_mut, stream::TryStreamExt, FutureExt, SinkExt, StreamExt};
use log::{debug, error, info, warn};
use nostr_sdk::{
  client_to_relay_communication::ClientMessage,
  relay_to_client_communication::notice::RelayToClientCommNotice,
};
use tokio::{
  net::{TcpListener, TcpStream},
  time::{self, Duration},
};
use tokio_tungstenite::tungstenite::{error::ProtocolError, Error as WsError, Message};
use uuid::Uuid;

use crate::{
  admission::{Collaborators, Relay},
  config::RelayConfig,
  error::RelayError,
  subscription::{send_message_to_client, ConnectionId, Tx},
};

const PING_INTERVAL: Duration = Duration::from_secs(20);

fn notice(message: String) -> String {
  RelayToClientCommNotice::new_notice(message).as_json()
}

/// Answers one text frame received from `connection`.
///
/// Malformed frames get a `NOTICE` and change nothing. `CLOSE` is not
/// answered.
pub async fn on_client_message(relay: &Relay, connection: ConnectionId, tx: &Tx, text: &str) {
  let message = match ClientMessage::from_json(text) {
    Ok(message) => message,
    Err(err) => {
      debug!("Malformed message from {connection}: {err}");
      send_message_to_client(tx, notice(format!("invalid: malformed message: {err}")));
      return;
    }
  };

  match message {
    ClientMessage::Event(message) => {
      let outcome = relay.submit(message.event).await;
      if let Some(quote) = outcome.notice {
        send_message_to_client(tx, quote.as_json());
      }
      send_message_to_client(tx, outcome.ok.as_json());
    }
    ClientMessage::Request(request) => {
      if let Err(err) = relay
        .subscribe(connection, &request.subscription_id, request.filters)
        .await
      {
        error!(
          "Subscription {} of {connection} failed: {err}",
          request.subscription_id
        );
        send_message_to_client(
          tx,
          notice(format!(
            "error: could not serve subscription {}",
            request.subscription_id
          )),
        );
      }
    }
    ClientMessage::Close(close) => {
      if !relay.unsubscribe(connection, &close.subscription_id) {
        debug!(
          "{connection} closed unknown subscription {}",
          close.subscription_id
        );
      }
    }
  }
}

async fn handle_connection(relay: Arc<Relay>, raw_stream: TcpStream, addr: SocketAddr) {
  let ws_stream = match tokio_tungstenite::accept_async(raw_stream).await {
    Ok(ws_stream) => ws_stream,
    Err(err) => {
      warn!("WebSocket handshake with {addr} failed: {err}");
      return;
    }
  };
  let connection = Uuid::new_v4();
  info!("WebSocket connection established: {addr} ({connection})");

  let mut interval = time::interval(PING_INTERVAL);
  let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
  relay.connect(connection, tx.clone());

  let (mut outgoing, incoming) = ws_stream.split();

  let ping_tx = tx.clone();
  let ping = async {
    loop {
      interval.tick().await;

      if let Err(err) = ping_tx.send(Message::Ping(vec![])) {
        error!("Error sending ping message: {err}");
        break Err::<(), WsError>(WsError::Protocol(ProtocolError::SendAfterClosing));
      }
      debug!("Sent ping to {addr}.");
    }
  };

  // Frames are handled one at a time, so replies keep the order of requests.
  let relay_ref = relay.as_ref();
  let tx_ref = &tx;
  let from_client = incoming.try_for_each(move |msg| async move {
    if let Message::Text(text) = msg {
      on_client_message(relay_ref, connection, tx_ref, &text).await;
    }
    Ok(())
  });

  let rx_to_client = async {
    while let Some(msg) = rx.recv().await {
      if let Err(err) = outgoing.send(msg).await {
        error!("Error sending to {addr}: {err}");
        return Err(WsError::Protocol(ProtocolError::SendAfterClosing));
      }
    }
    Ok(())
  };

  let (_, _, _) = future::select_all(vec![
    from_client.boxed(),
    ping.boxed(),
    rx_to_client.boxed(),
  ])
  .await;

  connection_cleanup(&relay, connection, addr);
}

/// Called once the connection with a client is closed, for whatever reason.
fn connection_cleanup(relay: &Relay, connection: ConnectionId, addr: SocketAddr) {
  info!("Client with address {addr} disconnected");
  relay.disconnect(connection);
}

/// Runs the relay until Ctrl-C.
#[tokio::main]
pub async fn initiate_relay(config: RelayConfig) -> Result<(), RelayError> {
  let collaborators = Collaborators::from_config(&config)?;
  let relay = Arc::new(Relay::new(&config, collaborators));

  let listener = TcpListener::bind(&config.relay_host).await?;
  info!("Listening on: {}", config.relay_host);

  let ctrl_c_listener = async {
    if let Err(err) = tokio::signal::ctrl_c().await {
      error!("Cannot listen for Ctrl-C: {err}");
      future::pending::<()>().await;
    }

    for tx in relay.subscriptions().senders() {
      send_message_to_client(
        &tx,
        notice(format!("Server {} closing connection...", config.relay_host)),
      );
      if tx.send(Message::Close(None)).is_err() {
        debug!("Connection already closed");
      }
    }
    info!("Ctrl-C received, shutting down");
  };

  let server = async {
    loop {
      match listener.accept().await {
        Ok((stream, addr)) => {
          tokio::spawn(handle_connection(Arc::clone(&relay), stream, addr));
        }
        Err(err) => error!("Could not accept connection: {err}"),
      }
    }
  };

  pin_mut!(server, ctrl_c_listener);
  future::select(server, ctrl_c_listener).await;

  Ok(())
}
