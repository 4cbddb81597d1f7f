use gecko_mqtt_proxy::config::{self, ProxyConfig};
use tokio::{fs, io::AsyncReadExt};

pub use simple::Simple;

mod simple;

#[derive(Debug, serde::Deserialize)]
pub struct Config {
    pub proxy: ProxyConfig,
    #[serde(default)]
    pub acl: Acl,
}

/// 允许客户端发布和订阅的主题，为空时不做限制
#[derive(Debug, Default, serde::Deserialize)]
pub struct Acl {
    #[serde(default)]
    pub allowed_topics: Vec<String>,
}

/// 可以通过 GECKO_PROXY_LISTEN_ADDR / GECKO_PROXY_BROKER_ADDR 覆盖配置文件
#[derive(Debug, serde::Deserialize)]
struct EnvOverrides {
    listen_addr: Option<String>,
    broker_addr: Option<String>,
}

impl Config {
    pub async fn from_path(path: &str) -> Result<Self, config::Error> {
        let read_err = |source| config::Error::Read {
            path: path.to_owned(),
            source,
        };
        let mut file = fs::File::open(path).await.map_err(read_err)?;
        let mut s = String::new();
        file.read_to_string(&mut s).await.map_err(read_err)?;

        Ok(toml::from_str::<Config>(&s)?)
    }

    pub fn apply_env(&mut self) -> Result<(), envy::Error> {
        let overrides = envy::prefixed("GECKO_PROXY_").from_env::<EnvOverrides>()?;
        self.merge(overrides);
        Ok(())
    }

    fn merge(&mut self, overrides: EnvOverrides) {
        if let Some(addr) = overrides.listen_addr {
            self.proxy.listen_addr = addr;
        }
        if let Some(addr) = overrides.broker_addr {
            self.proxy.broker_addr = addr;
        }
    }

    pub fn proxy_config(&self) -> config::Config {
        config::Config {
            proxy: self.proxy.clone(),
        }
    }
}
