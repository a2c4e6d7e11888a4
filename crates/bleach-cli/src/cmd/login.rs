use anyhow::Context;
use bleach_core::oauth::{self, Pkce, CALLBACK_PORTS};
use bleach_core::{Bleacher, HttpClient, ThreadSleeper};
use std::io::{BufRead, BufReader, Write};
use std::net::TcpListener;
use std::path::Path;

use crate::context;
use crate::output::print_json;

const CALLBACK_REPLY: &str =
    "HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: 2\r\nConnection: close\r\n\r\nOK";

// ---------------------------------------------------------------------------
// login
// ---------------------------------------------------------------------------

pub fn run(
    config_path: &Path,
    session: Option<&Path>,
    no_open: bool,
    json: bool,
) -> anyhow::Result<()> {
    let config = context::load_config(config_path)?;
    let app = config.api.oauth_app().context(
        "no OAuth client id: set api.client_id in the config or TWITTER_CLIENT_ID",
    )?;
    let store = context::session_store(session)?;

    let (listener, port) = bind_callback(&CALLBACK_PORTS)?;
    let redirect = oauth::redirect_uri(port);
    let pkce = Pkce::generate();
    let url = app
        .authorize_url(&redirect, &pkce)
        .context("failed to build authorize url")?;

    eprintln!("Open this URL in a browser and authorize the app:\n\n  {url}\n");
    if !no_open {
        if let Err(e) = open::that(&url) {
            tracing::debug!(error = %e, "could not open browser");
        }
    }

    tracing::info!(port, "waiting for the authorization redirect");
    let target = accept_redirect(&listener)?;
    let code = oauth::parse_callback(&target, &pkce.state)?;

    let http = oauth::token_client(config.api.timeout())?;
    let creds = app
        .exchange_code(&http, &code, &redirect, &pkce)
        .context("failed to exchange authorization code")?;

    let client = HttpClient::new(&config.api.base_url, creds, config.api.timeout())?
        .with_oauth(app);
    let sleeper = ThreadSleeper;
    let mut bleacher = Bleacher::new(client, config, &sleeper);
    let user = bleacher.whoami().context("token works but account lookup failed")?;
    let client = bleacher.into_api();

    store
        .save(client.credentials())
        .with_context(|| format!("failed to save session to {}", store.path().display()))?;

    if json {
        print_json(&serde_json::json!({
            "user": user,
            "session": store.path(),
        }))?;
    } else {
        println!("Logged in as @{} ({})", user.username, user.id);
        println!("Session saved to {}", store.path().display());
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Redirect listener
// ---------------------------------------------------------------------------

/// Bind the first free port on the loopback interface.
pub fn bind_callback(ports: &[u16]) -> anyhow::Result<(TcpListener, u16)> {
    for &port in ports {
        match TcpListener::bind(("127.0.0.1", port)) {
            Ok(listener) => {
                let bound = listener.local_addr()?.port();
                return Ok((listener, bound));
            }
            Err(e) => tracing::debug!(port, error = %e, "callback port unavailable"),
        }
    }
    anyhow::bail!(
        "none of the callback ports are free: {}",
        ports
            .iter()
            .map(u16::to_string)
            .collect::<Vec<_>>()
            .join(", ")
    )
}

/// Accept one request, answer `OK`, and return its request target.
pub fn accept_redirect(listener: &TcpListener) -> anyhow::Result<String> {
    let (stream, peer) = listener.accept().context("callback listener failed")?;
    tracing::debug!(%peer, "redirect received");

    let mut reader = BufReader::new(&stream);
    let mut line = String::new();
    reader
        .read_line(&mut line)
        .context("failed to read redirect request")?;
    let target = request_target(&line)
        .with_context(|| format!("not an HTTP request: {:?}", line.trim_end()))?
        .to_string();

    // Read the headers off the socket so closing it does not reset the
    // browser's connection.
    let mut header = String::new();
    loop {
        header.clear();
        if reader.read_line(&mut header)? == 0 || header.trim_end().is_empty() {
            break;
        }
    }

    let mut writer = &stream;
    writer.write_all(CALLBACK_REPLY.as_bytes())?;
    writer.flush()?;
    Ok(target)
}

/// `GET /?code=x HTTP/1.1` -> `/?code=x`
fn request_target(request_line: &str) -> Option<&str> {
    let mut parts = request_line.split_whitespace();
    let _method = parts.next()?;
    let target = parts.next()?;
    parts.next()?.starts_with("HTTP/").then_some(target)
}
