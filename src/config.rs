use anyhow::{Context, Result, bail};
use clap::Parser;
use std::{env, str::FromStr};

const DEFAULT_MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

/// Which object store holds photo content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectBackend {
    Local,
    S3,
}

impl FromStr for ObjectBackend {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "local" | "disk" => Ok(Self::Local),
            "s3" => Ok(Self::S3),
            other => bail!("unknown object store backend `{}` (expected `local` or `s3`)", other),
        }
    }
}

/// Connection settings for an S3-compatible object store.
#[derive(Clone)]
pub struct S3Settings {
    pub endpoint: Option<String>,
    pub region: String,
    pub bucket: String,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
}

impl std::fmt::Debug for S3Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Settings")
            .field("endpoint", &self.endpoint)
            .field("region", &self.region)
            .field("bucket", &self.bucket)
            .field("access_key_id", &self.access_key_id.as_ref().map(|_| "<set>"))
            .field("secret_access_key", &self.secret_access_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Centralized application configuration.
/// Combines environment variables and CLI arguments; read once at startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub backend: ObjectBackend,
    pub storage_dir: String,
    pub s3: Option<S3Settings>,
    pub supabase_project: Option<String>,
    pub public_url_base: Option<String>,
    pub max_upload_bytes: usize,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug, Default)]
#[command(author, version, about = "Photo upload API backed by an object store and SQLite")]
pub struct Args {
    /// Host to bind to (overrides PHOTO_STORE_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides PORT / PHOTO_STORE_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Database URL (overrides PHOTO_STORE_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Object store backend, `local` or `s3` (overrides PHOTO_STORE_BACKEND)
    #[arg(long)]
    pub backend: Option<String>,

    /// Directory for the local backend (overrides PHOTO_STORE_STORAGE_DIR)
    #[arg(long)]
    pub storage_dir: Option<String>,

    /// Base of public photo URLs (overrides PHOTO_STORE_PUBLIC_URL_BASE)
    #[arg(long)]
    pub public_url_base: Option<String>,

    /// Apply the schema and exit
    #[arg(long)]
    pub migrate: bool,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and migrate flag.
    pub fn from_env_and_args() -> Result<(Self, bool)> {
        let args = Args::parse();
        let migrate = args.migrate;
        Ok((Self::from_args(args)?, migrate))
    }

    /// Merge explicit CLI values over the process environment.
    pub fn from_args(args: Args) -> Result<Self> {
        // --- Environment fallback ---
        let env_host = env::var("PHOTO_STORE_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let env_port = match optional_var("PHOTO_STORE_PORT")?.or(optional_var("PORT")?) {
            Some(value) => value
                .parse::<u16>()
                .with_context(|| format!("parsing port value `{}`", value))?,
            None => 3000,
        };
        let env_db = env::var("PHOTO_STORE_DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://./data/meta/photo_store.db".into());
        let env_backend = env::var("PHOTO_STORE_BACKEND").unwrap_or_else(|_| "local".into());
        let env_storage =
            env::var("PHOTO_STORE_STORAGE_DIR").unwrap_or_else(|_| "./data/objects".into());
        let max_upload_bytes = match optional_var("PHOTO_STORE_MAX_UPLOAD_BYTES")? {
            Some(value) => value
                .parse::<usize>()
                .with_context(|| format!("parsing PHOTO_STORE_MAX_UPLOAD_BYTES value `{}`", value))?,
            None => DEFAULT_MAX_UPLOAD_BYTES,
        };

        let backend: ObjectBackend = args.backend.unwrap_or(env_backend).parse()?;
        let s3 = match backend {
            ObjectBackend::S3 => Some(S3Settings {
                endpoint: optional_var("S3_ENDPOINT")?,
                region: optional_var("S3_REGION")?.unwrap_or_else(|| "us-east-1".into()),
                bucket: optional_var("S3_BUCKET")?
                    .context("S3_BUCKET must be set when PHOTO_STORE_BACKEND=s3")?,
                access_key_id: optional_var("S3_ACCESS_KEY_ID")?,
                secret_access_key: optional_var("S3_SECRET_ACCESS_KEY")?,
            }),
            ObjectBackend::Local => None,
        };

        // --- Merge ---
        Ok(Self {
            host: args.host.unwrap_or(env_host),
            port: args.port.unwrap_or(env_port),
            database_url: args.database_url.unwrap_or(env_db),
            backend,
            storage_dir: args.storage_dir.unwrap_or(env_storage),
            s3,
            supabase_project: optional_var("SUPABASE_PROJECT")?,
            public_url_base: args
                .public_url_base
                .or(optional_var("PHOTO_STORE_PUBLIC_URL_BASE")?),
            max_upload_bytes,
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Base that storage keys are appended to when building public URLs.
    ///
    /// Priority: explicit base, Supabase public bucket, S3 path-style
    /// endpoint, and finally this service's own `/objects` route.
    pub fn public_url_base(&self) -> String {
        if let Some(base) = &self.public_url_base {
            return base.clone();
        }
        if let (Some(project), Some(s3)) = (&self.supabase_project, &self.s3) {
            return format!(
                "https://{}.supabase.co/storage/v1/object/public/{}",
                project, s3.bucket
            );
        }
        if let Some(s3) = &self.s3 {
            let endpoint = s3
                .endpoint
                .clone()
                .unwrap_or_else(|| format!("https://s3.{}.amazonaws.com", s3.region));
            return format!("{}/{}", endpoint.trim_end_matches('/'), s3.bucket);
        }
        let host = match self.host.as_str() {
            "0.0.0.0" | "::" => "localhost",
            other => other,
        };
        format!("http://{}:{}/objects", host, self.port)
    }
}

/// Read an env var, treating unset and empty the same way.
fn optional_var(name: &str) -> Result<Option<String>> {
    match env::var(name) {
        Ok(value) if value.trim().is_empty() => Ok(None),
        Ok(value) => Ok(Some(value)),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(err) => Err(err).with_context(|| format!("reading {}", name)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local_config() -> AppConfig {
        AppConfig {
            host: "0.0.0.0".into(),
            port: 3000,
            database_url: "sqlite::memory:".into(),
            backend: ObjectBackend::Local,
            storage_dir: "./data/objects".into(),
            s3: None,
            supabase_project: None,
            public_url_base: None,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }

    fn s3_settings() -> S3Settings {
        S3Settings {
            endpoint: Some("https://abc.supabase.co/storage/v1/s3/".into()),
            region: "eu-central-1".into(),
            bucket: "photos".into(),
            access_key_id: Some("key".into()),
            secret_access_key: Some("secret".into()),
        }
    }

    #[test]
    fn parses_backend_names() {
        assert_eq!("local".parse::<ObjectBackend>().unwrap(), ObjectBackend::Local);
        assert_eq!(" S3 ".parse::<ObjectBackend>().unwrap(), ObjectBackend::S3);
        assert!("gcs".parse::<ObjectBackend>().is_err());
    }

    #[test]
    fn local_base_points_at_objects_route() {
        assert_eq!(local_config().public_url_base(), "http://localhost:3000/objects");
    }

    #[test]
    fn explicit_base_wins() {
        let mut cfg = local_config();
        cfg.public_url_base = Some("https://cdn.example.com/p".into());
        cfg.s3 = Some(s3_settings());
        cfg.supabase_project = Some("abc".into());
        assert_eq!(cfg.public_url_base(), "https://cdn.example.com/p");
    }

    #[test]
    fn supabase_project_builds_public_bucket_url() {
        let mut cfg = local_config();
        cfg.backend = ObjectBackend::S3;
        cfg.s3 = Some(s3_settings());
        cfg.supabase_project = Some("abc".into());
        assert_eq!(
            cfg.public_url_base(),
            "https://abc.supabase.co/storage/v1/object/public/photos"
        );
    }

    #[test]
    fn s3_endpoint_is_path_style() {
        let mut cfg = local_config();
        cfg.backend = ObjectBackend::S3;
        cfg.s3 = Some(s3_settings());
        assert_eq!(
            cfg.public_url_base(),
            "https://abc.supabase.co/storage/v1/s3/photos"
        );
    }

    #[test]
    fn debug_output_hides_secrets() {
        let rendered = format!("{:?}", s3_settings());
        assert!(!rendered.contains("secret\""));
        assert!(rendered.contains("<redacted>"));
    }
}
