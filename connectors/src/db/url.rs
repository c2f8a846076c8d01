use sqlx::mysql::MySqlConnectOptions;

/// `user:pass@tcp(host:port)/db?params`, split into parts. Query parameters
/// are dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MysqlDsn<'a> {
    pub user: &'a str,
    pub password: Option<&'a str>,
    pub host: &'a str,
    pub port: Option<u16>,
    pub database: &'a str,
}

impl<'a> MysqlDsn<'a> {
    pub fn parse(raw: &'a str) -> Option<Self> {
        // The password may contain `@`, `/` or `)`, so split on the last `@tcp(`.
        let (userinfo, rest) = match raw.rfind("@tcp(") {
            Some(at) => (&raw[..at], &raw[at + "@tcp(".len()..]),
            None => ("", raw.strip_prefix("tcp(")?),
        };

        let (address, tail) = rest.rsplit_once(')')?;
        let database = tail.strip_prefix('/').unwrap_or(tail);
        let database = database.split('?').next().unwrap_or_default();

        let (host, port) = match address.rsplit_once(':') {
            Some((host, port)) if !host.ends_with(':') => (host, Some(port.parse().ok()?)),
            _ => (address, None),
        };

        let (user, password) = match userinfo.split_once(':') {
            Some((user, password)) => (user, Some(password)),
            None => (userinfo, None),
        };

        Some(Self {
            user,
            password,
            host: host.trim_start_matches('[').trim_end_matches(']'),
            port,
            database,
        })
    }

    pub fn connect_options(&self) -> MySqlConnectOptions {
        let mut options = MySqlConnectOptions::new().host(self.host);

        if !self.user.is_empty() {
            options = options.username(self.user);
        }
        if let Some(password) = self.password {
            options = options.password(password);
        }
        if let Some(port) = self.port {
            options = options.port(port);
        }
        if !self.database.is_empty() {
            options = options.database(self.database);
        }

        options
    }
}

/// DSN credentials are passed to sqlx as-is, never embedded in a URL.
pub fn mysql_options(raw: &str) -> Result<MySqlConnectOptions, sqlx::Error> {
    if !raw.starts_with("mysql://") {
        if let Some(dsn) = MysqlDsn::parse(raw) {
            return Ok(dsn.connect_options());
        }
        tracing::warn!("connection string is neither a mysql:// url nor a tcp dsn, using as-is");
    }

    raw.parse()
}

/// Replaces the password in a URL or DSN with `****` so it can be logged.
pub fn mask_password(conn: &str) -> String {
    let (scheme, rest) = match conn.find("://") {
        Some(idx) => conn.split_at(idx + 3),
        None => ("", conn),
    };

    let Some(at) = rest.rfind('@') else {
        return conn.to_string();
    };

    let userinfo = &rest[..at];
    match userinfo.find(':') {
        Some(colon) => format!("{scheme}{}:****{}", &userinfo[..colon], &rest[at..]),
        None => conn.to_string(),
    }
}
