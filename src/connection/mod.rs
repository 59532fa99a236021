//! Connection management for MongoDB
//!
//! Opens one client per transfer, checks it with a `ping` before any data
//! moves, and hands out database and collection handles. Listing helpers
//! for databases and collections live here as well.

use mongodb::bson::{Document, doc};
use mongodb::options::ClientOptions;
use mongodb::{Client, Collection, Database};
use tracing::{debug, info};

use crate::config::ConnectionConfig;
use crate::error::{ConnectionError, Result};

/// Connection state information
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    /// Not connected
    Disconnected,

    /// Connected and answering pings
    Connected,

    /// Connection failed
    Failed(String),
}

/// MongoDB connection manager
pub struct ConnectionManager {
    client: Option<Client>,
    config: ConnectionConfig,
    state: ConnectionState,
    uri: String,
}

impl ConnectionManager {
    /// Create a new connection manager
    ///
    /// # Arguments
    /// * `uri` - MongoDB connection URI
    /// * `config` - Connection configuration
    pub fn new(uri: String, config: ConnectionConfig) -> Self {
        Self {
            client: None,
            config,
            state: ConnectionState::Disconnected,
            uri,
        }
    }

    /// Establish the connection and verify it with a ping
    pub async fn connect(&mut self) -> Result<()> {
        info!("Connecting to {}", redact_uri(&self.uri));

        let options = self.client_options().await?;
        let client = Client::with_options(options).map_err(|e| {
            self.state = ConnectionState::Failed(e.to_string());
            ConnectionError::ConnectionFailed(e.to_string())
        })?;

        if let Err(e) = ping(&client).await {
            self.state = ConnectionState::Failed(e.to_string());
            return Err(e);
        }

        self.client = Some(client);
        self.state = ConnectionState::Connected;
        debug!("Connection verified");
        Ok(())
    }

    /// Close the client and release its pooled connections
    pub async fn disconnect(&mut self) -> Result<()> {
        if let Some(client) = self.client.take() {
            client.shutdown().await;
            debug!("Disconnected from {}", redact_uri(&self.uri));
        }
        self.state = ConnectionState::Disconnected;
        Ok(())
    }

    /// Get the MongoDB client
    pub fn get_client(&self) -> Result<&Client> {
        self.client
            .as_ref()
            .ok_or_else(|| ConnectionError::NotConnected.into())
    }

    /// Get a database handle
    pub fn get_database(&self, name: &str) -> Result<Database> {
        Ok(self.get_client()?.database(name))
    }

    /// Get a collection handle
    pub fn get_collection(&self, db: &str, name: &str) -> Result<Collection<Document>> {
        Ok(self.get_database(db)?.collection(name))
    }

    /// Names of all databases, sorted
    pub async fn list_databases(&self) -> Result<Vec<String>> {
        let mut names = self.get_client()?.list_database_names().await?;
        names.sort();
        Ok(names)
    }

    /// Names of the collections in `db`, sorted
    ///
    /// # Arguments
    /// * `db` - Database name
    /// * `name_regex` - Optional regular expression the name must match,
    ///   evaluated by the server
    pub async fn list_collections(&self, db: &str, name_regex: Option<&str>) -> Result<Vec<String>> {
        let database = self.get_database(db)?;
        let mut names = match name_regex {
            Some(regex) => {
                database
                    .list_collection_names()
                    .filter(doc! { "name": { "$regex": regex } })
                    .await?
            }
            None => database.list_collection_names().await?,
        };
        names.sort();
        Ok(names)
    }

    /// Get current connection state
    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    /// Check if currently connected
    pub fn is_connected(&self) -> bool {
        matches!(self.state, ConnectionState::Connected)
    }

    async fn client_options(&self) -> Result<ClientOptions> {
        let mut options = ClientOptions::parse(&self.uri)
            .await
            .map_err(|e| ConnectionError::InvalidUri(e.to_string()))?;

        let timeout = self.config.connect_timeout();
        options.app_name = Some(self.config.app_name.clone());
        options.connect_timeout = Some(timeout);
        options.server_selection_timeout = Some(timeout);
        Ok(options)
    }
}

async fn ping(client: &Client) -> Result<()> {
    client
        .database("admin")
        .run_command(doc! { "ping": 1 })
        .await
        .map_err(|e| ConnectionError::PingFailed(e.to_string()))?;
    Ok(())
}

/// Hide credentials in a connection string for logging
pub fn redact_uri(uri: &str) -> String {
    if let Some(proto_end) = uri.find("://") {
        if let Some(host_start) = uri.rfind('@') {
            if host_start > proto_end {
                return format!("{}***{}", &uri[..proto_end + 3], &uri[host_start..]);
            }
        }
        return uri.to_string();
    }
    if uri.contains('@') {
        "mongodb://***".to_string()
    } else {
        uri.to_string()
    }
}
