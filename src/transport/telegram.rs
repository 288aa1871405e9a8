//! Telegram Bot API transport.
//!
//! `TelegramClient` delivers alerts and command replies; `TelegramUpdates`
//! long-polls `getUpdates` for inbound commands. Recipients are chat ids.
//!
//! The bot token is part of every request URL and MUST NOT appear in logs or
//! error messages; errors are passed through `redact` before leaving here.

use anyhow::{anyhow, Context, Result};
use reqwest::blocking::multipart::{Form, Part};
use reqwest::blocking::{Client, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;

use crate::command::{CommandSource, InboundCommand, ResponseSink};
use crate::error::DeliveryError;
use crate::notify::NotificationChannel;
use crate::subscriber::RecipientId;

pub const DEFAULT_API_BASE: &str = "https://api.telegram.org";

/// Extra time on top of the long-poll timeout before the HTTP call gives up.
const POLL_GRACE: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
struct ApiReply<T> {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
    result: Option<T>,
}

#[derive(Debug, Deserialize)]
struct Update {
    update_id: i64,
    #[serde(default)]
    message: Option<Message>,
}

#[derive(Debug, Deserialize)]
struct Message {
    chat: Chat,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    from: Option<User>,
}

#[derive(Debug, Deserialize)]
struct Chat {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct User {
    #[serde(default)]
    username: Option<String>,
}

#[derive(Clone)]
pub struct TelegramClient {
    api_base: String,
    token: String,
    client: Client,
}

impl TelegramClient {
    pub fn new(token: impl Into<String>, timeout: Duration) -> Result<Self> {
        Self::with_api_base(DEFAULT_API_BASE, token, timeout)
    }

    pub fn with_api_base(
        api_base: impl Into<String>,
        token: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout + POLL_GRACE)
            .build()
            .context("build telegram http client")?;
        Ok(Self {
            api_base: api_base.into().trim_end_matches('/').to_string(),
            token: token.into(),
            client,
        })
    }

    /// Command stream backed by this client.
    pub fn updates(&self) -> TelegramUpdates {
        TelegramUpdates {
            client: self.clone(),
            offset: None,
        }
    }

    pub fn send_message(&self, chat_id: &str, text: &str) -> Result<()> {
        let body = serde_json::json!({ "chat_id": chat_id, "text": text });
        let response = self
            .client
            .post(self.method_url("sendMessage"))
            .json(&body)
            .send();
        self.finish::<serde_json::Value>("sendMessage", response)?;
        Ok(())
    }

    pub fn send_photo(&self, chat_id: &str, image: &[u8], caption: Option<&str>) -> Result<()> {
        let form = photo_form(chat_id, image, caption)?;
        let response = self
            .client
            .post(self.method_url("sendPhoto"))
            .multipart(form)
            .send();
        self.finish::<serde_json::Value>("sendPhoto", response)?;
        Ok(())
    }

    fn get_updates(&self, offset: Option<i64>, wait: Duration) -> Result<Vec<Update>> {
        let mut query = vec![
            ("timeout", wait.as_secs().to_string()),
            ("allowed_updates", r#"["message"]"#.to_string()),
        ];
        if let Some(offset) = offset {
            query.push(("offset", offset.to_string()));
        }
        let response = self
            .client
            .get(self.method_url("getUpdates"))
            .query(&query)
            .send();
        self.finish("getUpdates", response)
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_base, self.token, method)
    }

    fn finish<T: DeserializeOwned>(
        &self,
        method: &str,
        response: reqwest::Result<Response>,
    ) -> Result<T> {
        // Telegram explains rejections in the JSON body, so the status is not
        // checked here. Request URLs carry the token and are stripped.
        let response = response.map_err(|e| {
            anyhow!("telegram {}: {}", method, self.redact(&e.without_url().to_string()))
        })?;
        let body = response
            .text()
            .map_err(|e| anyhow!("read telegram {} response: {}", method, e.without_url()))?;
        parse_reply(method, &body)
    }

    fn redact(&self, text: &str) -> String {
        if self.token.is_empty() {
            return text.to_string();
        }
        text.replace(&self.token, "<token>")
    }
}

impl NotificationChannel for TelegramClient {
    fn name(&self) -> &'static str {
        "telegram"
    }

    fn send(
        &self,
        recipient: &RecipientId,
        text: &str,
        image: Option<&[u8]>,
    ) -> Result<(), DeliveryError> {
        self.send_message(recipient.as_str(), text)
            .map_err(|e| DeliveryError::new(format!("{:#}", e)))?;
        if let Some(image) = image {
            self.send_photo(recipient.as_str(), image, None)
                .map_err(|e| DeliveryError::new(format!("{:#}", e)))?;
        }
        Ok(())
    }
}

impl ResponseSink for TelegramClient {
    fn reply(&self, caller: &RecipientId, text: &str) -> Result<()> {
        self.send_message(caller.as_str(), text)
    }
}

/// `getUpdates` long-poll cursor.
pub struct TelegramUpdates {
    client: TelegramClient,
    offset: Option<i64>,
}

impl CommandSource for TelegramUpdates {
    fn name(&self) -> &'static str {
        "telegram"
    }

    fn poll(&mut self, wait: Duration) -> Result<Vec<InboundCommand>> {
        let updates = self.client.get_updates(self.offset, wait)?;
        let (next_offset, commands) = commands_from_updates(updates);
        if next_offset.is_some() {
            self.offset = next_offset;
        }
        Ok(commands)
    }
}

fn parse_reply<T: DeserializeOwned>(method: &str, body: &str) -> Result<T> {
    let reply: ApiReply<T> = serde_json::from_str(body)
        .with_context(|| format!("malformed telegram {} response", method))?;
    if !reply.ok {
        return Err(anyhow!(
            "telegram {} rejected: {}",
            method,
            reply.description.unwrap_or_else(|| "no description".to_string())
        ));
    }
    reply
        .result
        .ok_or_else(|| anyhow!("telegram {} response missing result", method))
}

/// Returns the next offset to acknowledge and the text messages received.
fn commands_from_updates(updates: Vec<Update>) -> (Option<i64>, Vec<InboundCommand>) {
    let next_offset = updates.iter().map(|update| update.update_id + 1).max();
    let commands = updates
        .into_iter()
        .filter_map(|update| update.message)
        .filter_map(|message| {
            let text = message.text?;
            if let Some(username) = message.from.and_then(|user| user.username) {
                log::debug!("command from @{} in chat {}: {}", username, message.chat.id, text);
            }
            Some(InboundCommand::new(message.chat.id.to_string(), text))
        })
        .collect();
    (next_offset, commands)
}

fn photo_form(chat_id: &str, image: &[u8], caption: Option<&str>) -> Result<Form> {
    let format = image::guess_format(image).ok();
    let mime = format
        .map(|format| format.to_mime_type())
        .unwrap_or("application/octet-stream");
    let extension = format
        .and_then(|format| format.extensions_str().first().copied())
        .unwrap_or("jpg");
    let photo = Part::bytes(image.to_vec())
        .file_name(format!("snapshot.{}", extension))
        .mime_str(mime)
        .context("photo content type")?;
    let mut form = Form::new().text("chat_id", chat_id.to_string()).part("photo", photo);
    if let Some(caption) = caption {
        form = form.text("caption", caption.to_string());
    }
    Ok(form)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::{TcpListener, TcpStream};
    use std::thread::JoinHandle;

    const UPDATES: &str = r#"{
        "ok": true,
        "result": [
            {
                "update_id": 100,
                "message": {
                    "message_id": 1,
                    "from": {"id": 42, "username": "alice"},
                    "chat": {"id": 42, "type": "private"},
                    "text": "/start"
                }
            },
            {
                "update_id": 101,
                "message": {
                    "message_id": 2,
                    "chat": {"id": -1001, "type": "group"},
                    "photo": []
                }
            },
            {
                "update_id": 102,
                "edited_message": {"chat": {"id": 42}}
            },
            {
                "update_id": 103,
                "message": {
                    "message_id": 3,
                    "chat": {"id": 7, "type": "private"},
                    "text": "/detect@WatchBot"
                }
            }
        ]
    }"#;

    #[test]
    fn updates_become_commands_and_advance_offset() {
        let updates: Vec<Update> = parse_reply("getUpdates", UPDATES).unwrap();
        let (offset, commands) = commands_from_updates(updates);

        assert_eq!(offset, Some(104));
        assert_eq!(
            commands,
            vec![
                InboundCommand::new("42", "/start"),
                InboundCommand::new("7", "/detect@WatchBot"),
            ]
        );
    }

    #[test]
    fn empty_batch_keeps_offset() {
        let (offset, commands) = commands_from_updates(Vec::new());
        assert_eq!(offset, None);
        assert!(commands.is_empty());
    }

    #[test]
    fn api_rejections_surface_description() {
        let err = parse_reply::<serde_json::Value>(
            "sendMessage",
            r#"{"ok":false,"error_code":403,"description":"Forbidden: bot was blocked by the user"}"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("bot was blocked"));
    }

    /// Accepts one request on a loopback port, answers with `status` and
    /// `body`, and hands back the raw request bytes.
    fn serve_once(status: &str, body: &'static str) -> (String, JoinHandle<Vec<u8>>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let status = status.to_string();
        let handle = std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let request = read_request(&mut stream);
            let response = format!(
                "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            );
            stream.write_all(response.as_bytes()).unwrap();
            request
        });
        (base, handle)
    }

    fn read_request(stream: &mut TcpStream) -> Vec<u8> {
        let mut request = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let read = stream.read(&mut chunk).unwrap();
            if read == 0 {
                return request;
            }
            request.extend_from_slice(&chunk[..read]);
            let Some(header_end) = find(&request, b"\r\n\r\n") else {
                continue;
            };
            let headers = String::from_utf8_lossy(&request[..header_end]).to_lowercase();
            let body = &request[header_end + 4..];
            let complete = match headers
                .lines()
                .find_map(|line| line.strip_prefix("content-length:"))
            {
                Some(length) => body.len() >= length.trim().parse::<usize>().unwrap(),
                None => body.ends_with(b"0\r\n\r\n"),
            };
            if complete {
                return request;
            }
        }
    }

    fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
        haystack.windows(needle.len()).position(|window| window == needle)
    }

    const PNG_MAGIC: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 1, 2, 3];

    #[test]
    fn send_photo_uploads_a_multipart_form() {
        let (base, server) = serve_once("200 OK", r#"{"ok":true,"result":{"message_id":9}}"#);
        let client = TelegramClient::with_api_base(base, "123:secret", Duration::from_secs(5)).unwrap();

        client.send_photo("42", PNG_MAGIC, Some("CAT DETECTED!")).unwrap();

        let request = server.join().unwrap();
        let text = String::from_utf8_lossy(&request);
        assert!(text.starts_with("POST /bot123:secret/sendPhoto "));
        assert!(text.to_lowercase().contains("content-type: multipart/form-data; boundary="));
        assert!(text.contains("name=\"chat_id\"\r\n\r\n42\r\n"));
        assert!(text.contains("name=\"caption\"\r\n\r\nCAT DETECTED!\r\n"));
        assert!(text.contains("name=\"photo\"; filename=\"snapshot.png\""));
        assert!(text.contains("image/png"));
        assert!(find(&request, PNG_MAGIC).is_some());
    }

    #[test]
    fn rejected_message_reports_description_without_token() {
        let (base, server) = serve_once(
            "403 Forbidden",
            r#"{"ok":false,"error_code":403,"description":"Forbidden: bot was blocked by the user"}"#,
        );
        let client = TelegramClient::with_api_base(base, "123:secret", Duration::from_secs(5)).unwrap();

        let err = client
            .send(&RecipientId::from("42"), "CAT DETECTED!", None)
            .unwrap_err();

        assert!(err.cause.contains("bot was blocked"), "{}", err);
        assert!(!err.cause.contains("secret"));
        let request = server.join().unwrap();
        assert!(String::from_utf8_lossy(&request).contains(r#""chat_id":"42""#));
    }

    #[test]
    fn transport_errors_do_not_leak_token() {
        let port = TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap().port();
        let client = TelegramClient::with_api_base(
            format!("http://127.0.0.1:{}", port),
            "123:secret",
            Duration::from_secs(1),
        )
        .unwrap();

        let err = client.send_message("42", "hello").unwrap_err();
        assert!(!format!("{:#}", err).contains("secret"), "{:#}", err);
    }

    #[test]
    fn token_is_redacted_from_errors() {
        let client = TelegramClient::new("123:secret", Duration::from_secs(1)).unwrap();
        let redacted = client.redact("https://api.telegram.org/bot123:secret/getUpdates: timeout");
        assert!(!redacted.contains("secret"));
        assert!(redacted.contains("<token>"));
    }
}
