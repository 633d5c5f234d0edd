//! DB2 container support via testcontainers.

use testcontainers::Image;
use testcontainers::core::{ContainerPort, WaitFor};

/// Port the DB2 instance listens on inside the container.
pub const DB2_PORT: u16 = 50000;

/// DB2 Community Edition container image.
///
/// The image needs a privileged container and takes several minutes to
/// create its first database.
#[derive(Debug, Clone)]
pub struct Db2Container {
    /// Password of the instance owner.
    pub password: String,
    /// Database created at startup.
    pub database: String,
    /// Container tag (version).
    pub tag: String,
}

impl Default for Db2Container {
    fn default() -> Self {
        Self {
            password: "Passw0rd".to_string(),
            database: "TESTDB".to_string(),
            tag: "11.5.9.0".to_string(),
        }
    }
}

impl Db2Container {
    /// Create a new DB2 container configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the `db2inst1` password.
    #[must_use]
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = password.into();
        self
    }

    /// Set the database created at startup.
    #[must_use]
    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = database.into();
        self
    }

    /// Set the container tag (DB2 version).
    #[must_use]
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = tag.into();
        self
    }

    /// Connection string for the instance owner on a mapped host port.
    #[must_use]
    pub fn connection_string(&self, host: &str, port: u16) -> String {
        format!(
            "Server={host}:{port};Database={};UID=db2inst1;PWD={}",
            self.database, self.password
        )
    }
}

impl Image for Db2Container {
    fn name(&self) -> &str {
        "icr.io/db2_community/db2"
    }

    fn tag(&self) -> &str {
        &self.tag
    }

    fn ready_conditions(&self) -> Vec<WaitFor> {
        vec![
            WaitFor::message_on_stdout("Setup has completed"),
            WaitFor::seconds(5),
        ]
    }

    fn env_vars(
        &self,
    ) -> impl IntoIterator<
        Item = (
            impl Into<std::borrow::Cow<'_, str>>,
            impl Into<std::borrow::Cow<'_, str>>,
        ),
    > {
        vec![
            ("LICENSE", "accept"),
            ("DB2INSTANCE", "db2inst1"),
            ("DB2INST1_PASSWORD", self.password.as_str()),
            ("DBNAME", self.database.as_str()),
            ("ARCHIVE_LOGS", "false"),
            ("AUTOCONFIG", "false"),
        ]
    }

    fn expose_ports(&self) -> &[ContainerPort] {
        &[ContainerPort::Tcp(DB2_PORT)]
    }
}
