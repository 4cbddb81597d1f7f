use tokio::{fs, io, io::AsyncReadExt};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Read config file {path} error: {source}")]
    Read { path: String, source: io::Error },
    #[error("Parse config error: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Config {
    pub proxy: ProxyConfig,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct ProxyConfig {
    /// 接收客户端连接的地址
    pub listen_addr: String,
    /// 转发的目标 broker 地址
    pub broker_addr: String,
}

impl Config {
    pub async fn from_path(path: &str) -> Result<Self, Error> {
        let read_err = |source| Error::Read {
            path: path.to_owned(),
            source,
        };
        let mut file = fs::File::open(path).await.map_err(read_err)?;
        let mut s = String::new();
        file.read_to_string(&mut s).await.map_err(read_err)?;

        s.parse()
    }
}

impl std::str::FromStr for Config {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(toml::from_str::<Config>(s)?)
    }
}
