//! # WebSocket Connector
//!
//! Production [`Connector`]: HTTPS authentication with `reqwest`, then a
//! WebSocket upgrade with `tokio-tungstenite`, pumped into a [`Link`].

use futures_util::future::BoxFuture;
use futures_util::{FutureExt, SinkExt, StreamExt};
use reqwest::header::{COOKIE, ORIGIN, REFERER, SET_COOKIE, USER_AGENT};
use serde::Deserialize;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header as ws_header;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use verdant_core::ServerConfig;

use crate::error::{ConnectionError, ConnectionResult};
use crate::transport::{Connector, Credential, Link, LINK_CAPACITY};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AuthResponse {
    #[serde(default)]
    is_authenticated: bool,
}

/// Connects to the game server over HTTPS and WSS.
#[derive(Clone, Debug)]
pub struct WsConnector {
    http: reqwest::Client,
    server: ServerConfig,
}

impl WsConnector {
    /// Creates a connector for `server`.
    #[must_use]
    pub fn new(server: ServerConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            server,
        }
    }

    fn origin(&self) -> String {
        format!("https://{}", self.server.host)
    }

    /// Authentication endpoint of `room`.
    #[must_use]
    pub fn auth_url(&self, room: &str) -> String {
        format!(
            "https://{}/version/{}/api/rooms/{}/user/authenticate-web",
            self.server.host, self.server.game_version, room
        )
    }

    /// Socket endpoint of `room` for `player_id`.
    #[must_use]
    pub fn socket_url(&self, room: &str, player_id: &str) -> String {
        format!(
            "wss://{host}/version/{ver}/api/rooms/{room}/connect?surface=%22web%22&platform=%22desktop%22\
             &playerId=%22{player_id}%22&version=%22{ver}%22&source=%22manualUrl%22\
             &capabilities=%22fbo_mipmap_unsupported%22",
            host = self.server.host,
            ver = self.server.game_version,
        )
    }

    async fn authenticate_inner(&self, room: &str, credential: &Credential) -> ConnectionResult<Credential> {
        let response = self
            .http
            .post(self.auth_url(room))
            .header(COOKIE, &credential.cookies)
            .header(ORIGIN, self.origin())
            .header(REFERER, format!("{}/r/{room}", self.origin()))
            .header(USER_AGENT, &self.server.user_agent)
            .json(&serde_json::json!({ "provider": "maybe-existing-jwt" }))
            .send()
            .await
            .map_err(|e| ConnectionError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ConnectionError::Auth(format!("auth endpoint answered {status}")));
        }
        let set_cookies: Vec<String> = response
            .headers()
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok().map(str::to_owned))
            .collect();
        let body: AuthResponse = response
            .json()
            .await
            .map_err(|e| ConnectionError::Auth(format!("unreadable auth response: {e}")))?;
        if !body.is_authenticated {
            return Err(ConnectionError::Auth("session cookie rejected".into()));
        }
        Ok(Credential::new(merge_cookies(&credential.cookies, &set_cookies)))
    }

    async fn open_inner(&self, room: &str, player_id: &str, credential: &Credential) -> ConnectionResult<Link> {
        let transport = |e: &dyn std::fmt::Display| ConnectionError::Transport(e.to_string());
        let mut request = self
            .socket_url(room, player_id)
            .into_client_request()
            .map_err(|e| transport(&e))?;
        let headers = request.headers_mut();
        headers.insert(
            ws_header::ORIGIN,
            HeaderValue::from_str(&self.origin()).map_err(|e| transport(&e))?,
        );
        headers.insert(
            ws_header::USER_AGENT,
            HeaderValue::from_str(&self.server.user_agent).map_err(|e| transport(&e))?,
        );
        headers.insert(
            ws_header::COOKIE,
            HeaderValue::from_str(&credential.cookies).map_err(|e| transport(&e))?,
        );

        let (socket, _) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(|e| transport(&e))?;
        tracing::debug!("socket open to {}", room);

        let (mut sink, mut stream) = socket.split();
        let (bot, mut pump) = Link::pair(LINK_CAPACITY);

        tokio::spawn(async move {
            while let Some(text) = pump.rx.recv().await {
                if let Err(error) = sink.send(Message::Text(text)).await {
                    tracing::debug!("socket write failed: {}", error);
                    break;
                }
            }
            let _ = sink.close().await;
        });

        let inbound = pump.tx;
        tokio::spawn(async move {
            loop {
                let frame = tokio::select! {
                    frame = stream.next() => frame,
                    () = inbound.closed() => break,
                };
                let text = match frame {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes) {
                        Ok(text) => text,
                        Err(_) => continue,
                    },
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => continue,
                    Some(Err(error)) => {
                        tracing::debug!("socket read failed: {}", error);
                        break;
                    }
                };
                if inbound.send(text).await.is_err() {
                    break;
                }
            }
        });

        Ok(bot)
    }
}

impl Connector for WsConnector {
    fn authenticate<'a>(
        &'a self,
        room: &'a str,
        credential: &'a Credential,
    ) -> BoxFuture<'a, ConnectionResult<Credential>> {
        self.authenticate_inner(room, credential).boxed()
    }

    fn open<'a>(
        &'a self,
        room: &'a str,
        player_id: &'a str,
        credential: &'a Credential,
    ) -> BoxFuture<'a, ConnectionResult<Link>> {
        self.open_inner(room, player_id, credential).boxed()
    }
}

/// Folds `Set-Cookie` values into a cookie header, replacing same-named
/// cookies and keeping the original order.
#[must_use]
pub fn merge_cookies(existing: &str, set_cookies: &[String]) -> String {
    let mut jar: Vec<(String, String)> = existing
        .split(';')
        .filter_map(|pair| {
            let (name, value) = pair.trim().split_once('=')?;
            Some((name.trim().to_owned(), value.trim().to_owned()))
        })
        .collect();
    for header in set_cookies {
        let Some((name, value)) = header.split(';').next().and_then(|pair| pair.split_once('=')) else {
            continue;
        };
        let (name, value) = (name.trim(), value.trim());
        match jar.iter_mut().find(|(existing, _)| existing == name) {
            Some(slot) => slot.1 = value.to_owned(),
            None => jar.push((name.to_owned(), value.to_owned())),
        }
    }
    jar.iter()
        .map(|(name, value)| format!("{name}={value}"))
        .collect::<Vec<_>>()
        .join("; ")
}
