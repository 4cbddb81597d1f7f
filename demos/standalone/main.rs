use std::sync::Arc;

use clap::Parser;
use demos::{Config, Simple};
use gecko_mqtt_proxy::proxy::Proxy;

#[derive(Parser)]
#[clap(author, version, about = "mqtt proxy that logs every client packet")]
struct Args {
    /// 配置文件路径
    #[clap(short, long, default_value = "./standalone.toml")]
    config: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let _logger = flexi_logger::Logger::try_with_env_or_str("info")?
        .format(flexi_logger::detailed_format)
        .start()?;

    // 获取配置
    let args = Args::parse();
    let mut cfg = Config::from_path(&args.config).await?;
    cfg.apply_env()?;

    // 启动代理
    let handler = Arc::new(Simple::new(cfg.acl.allowed_topics.clone()));
    Proxy::new(cfg.proxy_config())
        .start_with_handler(handler)
        .await?;
    Ok(())
}
