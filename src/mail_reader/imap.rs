use async_imap::{Client, Session};
use async_trait::async_trait;
use futures::TryStreamExt;
use itertools::Itertools;
use tokio::net::TcpStream;
use tokio_native_tls::TlsStream;
use tokio_util::compat::{Compat, TokioAsyncReadCompatExt};

use crate::error::{Error, Result};
use crate::group_rules::group_settings::MailboxIdentity;
use crate::mail_reader::message::RawMessage;
use crate::mail_reader::MailboxSource;
use log::{debug, info, warn};

type ImapStream = Compat<TlsStream<TcpStream>>;

const INBOX: &str = "INBOX";

/// Where a session is in its lifecycle. `Failed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unconnected,
    Connected,
    Authenticated,
    FolderSelected,
    Idle,
    Failed,
}

enum Connection {
    Closed,
    Client(Client<ImapStream>),
    Session(Session<ImapStream>),
}

/// One connection to one mailbox: connect, log in, read unread messages.
pub struct MailboxSession<'a> {
    identity: &'a MailboxIdentity,
    state: SessionState,
    connection: Connection,
}

/// A rejected LOGIN is an authentication failure. Anything else that
/// breaks the exchange is treated as a transport problem.
fn login_error(identity: &MailboxIdentity, err: async_imap::error::Error) -> Error {
    match err {
        async_imap::error::Error::No(message) | async_imap::error::Error::Bad(message) => {
            Error::Authentication {
                username: identity.username.clone(),
                message,
            }
        }
        other => Error::Protocol(other),
    }
}

fn greeting_received<T>(greeting: Option<std::io::Result<T>>) -> std::result::Result<(), String> {
    match greeting {
        Some(Ok(_)) => Ok(()),
        Some(Err(e)) => Err(format!("cannot read greeting: {}", e)),
        None => Err("no greeting".to_string()),
    }
}

impl<'a> MailboxSession<'a> {
    pub fn new(identity: &'a MailboxIdentity) -> Self {
        MailboxSession {
            identity,
            state: SessionState::Unconnected,
            connection: Connection::Closed,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    fn fail<T>(&mut self, err: Error) -> Result<T> {
        self.state = SessionState::Failed;
        self.connection = Connection::Closed;
        Err(err)
    }

    fn connection_error(&self, err: impl std::fmt::Display) -> Error {
        Error::Connection {
            host: self.identity.host.clone(),
            port: self.identity.port,
            message: err.to_string(),
        }
    }

    fn expect_state(&mut self, expected: SessionState) -> Result<()> {
        if self.state == expected {
            return Ok(());
        }
        let message = format!("expected session state {:?}, found {:?}", expected, self.state);
        self.fail(Error::Connection {
            host: self.identity.host.clone(),
            port: self.identity.port,
            message,
        })
    }

    async fn open_stream(&self) -> Result<TlsStream<TcpStream>> {
        let host = self.identity.host.as_str();
        let tcp_stream = TcpStream::connect((host, self.identity.port))
            .await
            .map_err(|e| self.connection_error(e))?;
        let tls = native_tls::TlsConnector::new().map_err(|e| self.connection_error(e))?;
        let tls = tokio_native_tls::TlsConnector::from(tls);

        let tcp_stream = if self.identity.use_start_tls {
            let mut client = Client::new(tcp_stream.compat());
            greeting_received(client.read_response().await)
                .map_err(|e| self.connection_error(e))?;
            client
                .run_command_and_check_ok("STARTTLS", None)
                .await
                .map_err(|e| self.connection_error(format!("STARTTLS failed: {}", e)))?;
            debug!("-- STARTTLS accepted by {}", host);
            client.into_inner().into_inner()
        } else {
            tcp_stream
        };

        tls.connect(host, tcp_stream)
            .await
            .map_err(|e| self.connection_error(format!("TLS handshake failed: {}", e)))
    }

    /// Opens the transport. With `useStartTLS` the connection starts in
    /// plaintext and is upgraded before anything else is sent.
    pub async fn connect(&mut self) -> Result<()> {
        self.expect_state(SessionState::Unconnected)?;
        match self.open_stream().await {
            Ok(tls_stream) => {
                self.connection = Connection::Client(Client::new(tls_stream.compat()));
                self.state = SessionState::Connected;
                info!("-- connected to {}:{}", self.identity.host, self.identity.port);
                Ok(())
            }
            Err(e) => self.fail(e),
        }
    }

    pub async fn authenticate(&mut self) -> Result<()> {
        self.expect_state(SessionState::Connected)?;
        let Connection::Client(client) = std::mem::replace(&mut self.connection, Connection::Closed) else {
            return self.fail(self.connection_error("no open connection"));
        };

        match client.login(&self.identity.username, &self.identity.password).await {
            Ok(session) => {
                self.connection = Connection::Session(session);
                self.state = SessionState::Authenticated;
                info!("-- logged in as {}", self.identity.username);
                Ok(())
            }
            Err((e, _)) => self.fail(login_error(self.identity, e)),
        }
    }

    async fn select_and_fetch(&mut self) -> Result<Vec<RawMessage>> {
        let Connection::Session(session) = &mut self.connection else {
            return Err(self.connection_error("not logged in"));
        };

        session.select(INBOX).await?;
        self.state = SessionState::FolderSelected;
        info!("-- {} selected", INBOX);

        let mut unseen: Vec<u32> = session.search("UNSEEN").await?.into_iter().collect();
        unseen.sort_unstable();
        info!("-- {} unread messages in {}", unseen.len(), self.identity.username);
        if unseen.is_empty() {
            return Ok(Vec::new());
        }

        // BODY.PEEK leaves the \Seen flag alone, unlike RFC822.
        let sequence_set = unseen.iter().join(",");
        let fetches: Vec<_> = session
            .fetch(&sequence_set, "BODY.PEEK[]")
            .await?
            .try_collect()
            .await?;

        let messages = fetches
            .iter()
            .filter_map(|fetch| match fetch.body() {
                Some(body) => Some(RawMessage {
                    id: fetch.message,
                    body: body.to_vec(),
                }),
                None => {
                    warn!("Message {} came back without a body", fetch.message);
                    None
                }
            })
            .collect();
        Ok(messages)
    }

    /// Selects the inbox and downloads every unread message without
    /// marking anything as read.
    pub async fn fetch_unread(&mut self) -> Result<Vec<RawMessage>> {
        self.expect_state(SessionState::Authenticated)?;
        match self.select_and_fetch().await {
            Ok(messages) => {
                self.state = SessionState::Idle;
                Ok(messages)
            }
            Err(e) => self.fail(e),
        }
    }

    /// Be nice to the server and log out. Errors are only logged.
    pub async fn logout(mut self) {
        if let Connection::Session(mut session) = std::mem::replace(&mut self.connection, Connection::Closed) {
            if let Err(e) = session.logout().await {
                debug!("Logout from {} failed: {}", self.identity.host, e);
            }
        }
    }
}

/// Reads mailboxes over IMAP.
#[derive(Debug, Default, Clone, Copy)]
pub struct ImapMailboxes;

#[async_trait(?Send)]
impl MailboxSource for ImapMailboxes {
    async fn fetch_unread(&self, mailbox: &MailboxIdentity) -> Result<Vec<RawMessage>> {
        let mut session = MailboxSession::new(mailbox);
        session.connect().await?;
        session.authenticate().await?;
        let messages = session.fetch_unread().await;
        session.logout().await;
        messages
    }
}

/// Connects and logs in without touching any folder, to validate
/// credentials.
pub async fn check_connection(mailbox: &MailboxIdentity) -> Result<()> {
    let mut session = MailboxSession::new(mailbox);
    session.connect().await?;
    session.authenticate().await?;
    debug!("Connection check for {} reached {:?}", mailbox.host, session.state());
    session.logout().await;
    Ok(())
}
