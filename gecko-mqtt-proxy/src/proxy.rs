//! tcp 代理
//! 每接收一个客户端连接，就向 broker 建立一条连接，并在两者之间运行代理

use std::sync::Arc;

use log::{debug, error, info};
use tokio::net::{TcpListener, TcpStream};

use crate::{
    config::Config,
    error::Error,
    hook::{Handler, HookNoop},
    session::Context,
    stream,
};

pub struct Proxy {
    cfg: Config,
}

impl Proxy {
    pub fn new(cfg: Config) -> Self {
        Self { cfg }
    }

    pub async fn start(&self) -> Result<(), Error> {
        self.start_with_handler(Arc::new(HookNoop)).await
    }

    pub async fn start_with_handler<H: Handler>(&self, handler: Arc<H>) -> Result<(), Error> {
        let addr = &self.cfg.proxy.listen_addr;
        let listener = TcpListener::bind(addr).await.map_err(|source| Error::Bind {
            addr: addr.clone(),
            source,
        })?;
        info!(
            "proxy listening on {}, forwarding to {}",
            addr, self.cfg.proxy.broker_addr
        );
        self.serve(listener, handler).await
    }

    /// 在已经绑定好的 listener 上接收客户端连接
    pub async fn serve<H: Handler>(
        &self,
        listener: TcpListener,
        handler: Arc<H>,
    ) -> Result<(), Error> {
        loop {
            // 获取到连接
            let (inbound, addr) = match listener.accept().await {
                Ok((s, a)) => (s, a),
                Err(e) => {
                    error!("accept tcp stream err: {}", e);
                    continue;
                }
            };
            info!("new stream comming in: {}", addr);

            let broker_addr = self.cfg.proxy.broker_addr.clone();
            let handler = handler.clone();
            tokio::spawn(async move {
                let outbound = match TcpStream::connect(&broker_addr).await {
                    Ok(stream) => stream,
                    Err(e) => {
                        error!("connect to broker {} for {} err: {}", broker_addr, addr, e);
                        return;
                    }
                };
                // 明文 tcp，没有客户端证书
                match stream::start(Context::new(), inbound, outbound, handler, None).await {
                    Ok(()) => debug!("session from {} closed", addr),
                    Err(e) => error!("session from {} exit error: {}", addr, e),
                }
            });
        }
    }
}
