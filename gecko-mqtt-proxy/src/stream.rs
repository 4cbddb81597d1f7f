//! 代理核心
//! 客户端的 connect 报文鉴权通过后，在客户端与 broker 之间双向转发报文
//!
//! * 上行（客户端 -> broker）：读取、鉴权、转发、通知，严格按顺序处理每个报文
//! * 下行（broker -> client）：只读取和转发，broker 被视为可信的一方
//!
//! 两个方向各自运行在独立的任务中，任意一方结束，整个会话结束。

use std::{fmt, sync::Arc};

use log::{debug, info};
use tokio::{
    io::{self, AsyncRead, AsyncWrite},
    sync::mpsc::{self, Sender},
};

use crate::{
    error::{Error, Reason},
    hook::Handler,
    network::{
        packet::{Connect, Login, Packet},
        PacketReader, PacketWriter,
    },
    session::{Certificate, Context, Session},
};

/// 上下文中找不到身份时，错误信息中使用的客户端 id
const UNKNOWN_CLIENT: &str = "unknown";

/// 报文转发方向
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// 客户端 -> broker
    Upstream,
    /// broker -> 客户端
    Downstream,
}

impl Direction {
    /// 附上客户端 id 和方向信息
    /// 对端正常关闭不是错误，不应该走到这里
    fn wrap(self, ctx: &Context, reason: impl Into<Reason>) -> Error {
        let client_id = ctx
            .try_session()
            .map_or(UNKNOWN_CLIENT, |session| session.id.as_str())
            .to_owned();
        let reason = reason.into();
        match self {
            Direction::Upstream => Error::Upstream { client_id, reason },
            Direction::Downstream => Error::Downstream { client_id, reason },
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Upstream => f.write_str("client->broker"),
            Direction::Downstream => f.write_str("broker->client"),
        }
    }
}

/// 开始代理一个客户端连接
///
/// * `inbound` 客户端连接
/// * `outbound` broker 连接
/// * `cert` 客户端 tls 证书，没有时传 None
///
/// 一直阻塞到会话结束。任意一端在报文边界处正常关闭时返回 Ok，
/// 其余情况返回带有方向信息的错误。返回时两端连接均已释放。
pub async fn start<I, O, H>(
    ctx: Context,
    inbound: I,
    outbound: O,
    handler: Arc<H>,
    cert: Option<Certificate>,
) -> Result<(), Error>
where
    I: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    O: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    H: Handler,
{
    let (client_read, client_write) = io::split(inbound);
    let (broker_read, broker_write) = io::split(outbound);
    let mut client_reader = PacketReader::new(client_read);
    let mut broker_writer = PacketWriter::new(broker_write);

    let ctx = handshake(
        ctx,
        &mut client_reader,
        &mut broker_writer,
        handler.as_ref(),
        cert,
    )
    .await?;

    // 两个方向各自报告一次结果
    // 缓冲区可以容纳两个结果，后结束的一方发送时不会阻塞
    let (result_tx, mut result_rx) = mpsc::channel(RELAY_COUNT);
    let upstream = tokio::spawn(relay(
        Direction::Upstream,
        ctx.clone(),
        client_reader,
        broker_writer,
        handler.clone(),
        result_tx.clone(),
    ));
    let downstream = tokio::spawn(relay(
        Direction::Downstream,
        ctx.clone(),
        PacketReader::new(broker_read),
        PacketWriter::new(client_write),
        handler.clone(),
        result_tx,
    ));

    // 只处理最先结束的一方
    let result = result_rx.recv().await.unwrap_or(Err(Error::RelayAborted));

    // 主动结束另一方，两端连接随之释放
    upstream.abort();
    downstream.abort();
    let _ = upstream.await;
    let _ = downstream.await;

    if let Some(session) = ctx.try_session() {
        match &result {
            Ok(()) => info!("client {} disconnected", session.id),
            Err(e) => info!("client {} disconnected: {}", session.id, e),
        }
        handler.disconnect(session).await;
    }

    result
}

/// 第一个报文，必须是 connect 报文
/// 鉴权通过后转发给 broker，返回存有身份的上下文
async fn handshake<R, W, H>(
    ctx: Context,
    reader: &mut PacketReader<R>,
    writer: &mut PacketWriter<W>,
    handler: &H,
    cert: Option<Certificate>,
) -> Result<Context, Error>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
    H: Handler,
{
    let packet = reader.read_packet().await.map_err(Error::Handshake)?;
    let mut connect = match packet {
        Packet::Connect(connect) => connect,
        packet => return Err(Error::ProtocolViolation(packet.packet_type())),
    };

    let mut session = session_from_connect(&connect, cert);
    debug!("authorize connect from client {}", session.id);
    // 客户端的连接请求还没有到达 broker，认证失败算作下行错误
    let pending = ctx.with_session(session.clone());
    if let Err(e) = handler.auth_connect(&mut session).await {
        return Err(Direction::Downstream.wrap(&pending, Reason::Denied(e)));
    }

    // 回调可能修改了身份信息，写回 connect 报文
    // 只有 connect 报文带有身份信息
    write_back(&session, &mut connect);
    let ctx = ctx.with_session(session);

    // 发送给 broker
    writer
        .write_packet(&Packet::Connect(connect))
        .await
        .map_err(|e| Direction::Upstream.wrap(&ctx, e))?;

    info!("client {} connected", ctx.session()?.id);
    Ok(ctx)
}

fn session_from_connect(connect: &Connect, cert: Option<Certificate>) -> Session {
    let (username, password) = match &connect.login {
        Some(login) => (
            login.username.clone(),
            login.password.clone().unwrap_or_default(),
        ),
        None => (String::new(), Default::default()),
    };

    Session {
        id: connect.client_id.clone(),
        username,
        password,
        cert,
    }
}

fn write_back(session: &Session, connect: &mut Connect) {
    connect.client_id = session.id.clone();

    // 原本没有登录凭证，回调也没有设置，保持原样
    if connect.login.is_none() && session.username.is_empty() && session.password.is_empty() {
        return;
    }

    let had_password = matches!(&connect.login, Some(Login { password: Some(_), .. }));
    let password = (had_password || !session.password.is_empty()).then(|| session.password.clone());
    connect.login = Some(Login {
        username: session.username.clone(),
        password,
    });
}

/// 转发任务的数量，每个方向一个
const RELAY_COUNT: usize = 2;

/// 每个转发任务持有一个，保证任务无论如何结束都会报告一次结果
/// 任务 panic 时没有机会发送，drop 时补报 [`Error::RelayAborted`]
struct Report {
    results: Option<Sender<Result<(), Error>>>,
}

impl Report {
    fn new(results: Sender<Result<(), Error>>) -> Self {
        Self {
            results: Some(results),
        }
    }

    /// 每个任务最多报告一次，缓冲区不会满
    fn send(&mut self, result: Result<(), Error>) {
        if let Some(results) = self.results.take() {
            // 会话可能已经返回，不再关心这个结果
            let _ = results.try_send(result);
        }
    }
}

impl Drop for Report {
    fn drop(&mut self) {
        self.send(Err(Error::RelayAborted));
    }
}

/// 一个方向的转发任务，结束时把结果发送到 results
async fn relay<R, W, H>(
    direction: Direction,
    ctx: Context,
    mut reader: PacketReader<R>,
    mut writer: PacketWriter<W>,
    handler: Arc<H>,
    results: Sender<Result<(), Error>>,
) where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
    H: Handler,
{
    let mut report = Report::new(results);
    let result = forward(direction, &ctx, &mut reader, &mut writer, handler.as_ref()).await;
    match &result {
        Ok(()) => debug!("{} stream closed by peer", direction),
        Err(e) => debug!("{} stream exit error: {}", direction, e),
    }
    report.send(result);
}

/// 读取、鉴权、转发、通知
/// 同一个方向上的报文严格按顺序处理
async fn forward<R, W, H>(
    direction: Direction,
    ctx: &Context,
    reader: &mut PacketReader<R>,
    writer: &mut PacketWriter<W>,
    handler: &H,
) -> Result<(), Error>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
    H: Handler,
{
    loop {
        // 从一端读取
        let mut packet = match reader.read_packet().await {
            Ok(packet) => packet,
            Err(e) if e.is_clean_close() => return Ok(()),
            Err(e) => return Err(direction.wrap(ctx, e)),
        };

        if direction == Direction::Upstream {
            authorize(ctx, &mut packet, handler)
                .await
                .map_err(|reason| direction.wrap(ctx, reason))?;
        }

        // 发送给另一端
        writer
            .write_packet(&packet)
            .await
            .map_err(|e| direction.wrap(ctx, e))?;

        if direction == Direction::Upstream {
            notify(ctx, &packet, handler)
                .await
                .map_err(|reason| direction.wrap(ctx, reason))?;
        }
    }
}

async fn authorize<H: Handler>(
    ctx: &Context,
    packet: &mut Packet,
    handler: &H,
) -> Result<(), Reason> {
    let result = match packet {
        // 会话已经建立，这里对身份的修改不再生效
        Packet::Connect(_) => {
            let mut session = ctx.session()?.clone();
            handler.auth_connect(&mut session).await
        }
        Packet::Publish(publish) => {
            handler
                .auth_publish(ctx.session()?, &mut publish.topic, &mut publish.payload)
                .await
        }
        Packet::Subscribe(subscribe) => {
            handler
                .auth_subscribe(ctx.session()?, &mut subscribe.topics)
                .await
        }
        Packet::Unsubscribe(_) | Packet::Other(_) => Ok(()),
    };

    result.map_err(Reason::Denied)
}

async fn notify<H: Handler>(ctx: &Context, packet: &Packet, handler: &H) -> Result<(), Reason> {
    match packet {
        Packet::Connect(_) => handler.connect(ctx.session()?).await,
        Packet::Publish(publish) => {
            handler
                .publish(ctx.session()?, &publish.topic, &publish.payload)
                .await
        }
        Packet::Subscribe(subscribe) => {
            handler
                .subscribe(ctx.session()?, &subscribe.topics)
                .await
        }
        Packet::Unsubscribe(unsubscribe) => {
            handler
                .unsubscribe(ctx.session()?, &unsubscribe.topics)
                .await
        }
        Packet::Other(_) => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::{sync::Mutex, time::Duration};

    use async_trait::async_trait;
    use bytes::{Bytes, BytesMut};
    use tokio::{
        io::{AsyncWriteExt, DuplexStream, ReadHalf, WriteHalf},
        sync::Notify,
        task::JoinHandle,
        time,
    };

    use super::*;
    use crate::{
        hook::{Authorizer, HookError, Notifier},
        network::{
            conn,
            packet::{PacketType, Protocol, Publish, QoS, Subscribe, Unsubscribe},
        },
    };

    const WAIT: Duration = Duration::from_secs(5);

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Event {
        AuthConnect(String),
        AuthPublish(String),
        AuthSubscribe(Vec<String>),
        Connect(String),
        Publish(String, Bytes),
        Subscribe(Vec<String>),
        Unsubscribe(Vec<String>),
        Disconnect(String),
    }

    /// 记录所有回调，并按配置拒绝或改写报文
    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<Event>>,
        deny_connect: bool,
        deny_topic: Option<String>,
        deny_subscribe: bool,
        rename_user: Option<String>,
        rewrite_publish: Option<(String, Bytes)>,
        drop_filter: Option<String>,
        panic_publish: bool,
        published: Notify,
    }

    impl Recorder {
        fn push(&self, event: Event) {
            self.events.lock().unwrap().push(event);
        }

        fn events(&self) -> Vec<Event> {
            self.events.lock().unwrap().clone()
        }

        fn disconnects(&self) -> usize {
            self.events()
                .iter()
                .filter(|e| matches!(e, Event::Disconnect(_)))
                .count()
        }
    }

    #[async_trait]
    impl Authorizer for Recorder {
        async fn auth_connect(&self, session: &mut Session) -> Result<(), HookError> {
            self.push(Event::AuthConnect(session.id.clone()));
            if self.deny_connect {
                return Err("banned".into());
            }
            if let Some(username) = &self.rename_user {
                session.username = username.clone();
            }
            Ok(())
        }

        async fn auth_publish(
            &self,
            _session: &Session,
            topic: &mut String,
            payload: &mut Bytes,
        ) -> Result<(), HookError> {
            self.push(Event::AuthPublish(topic.clone()));
            if self.panic_publish {
                panic!("publish hook crashed");
            }
            if self.deny_topic.as_deref() == Some(topic.as_str()) {
                return Err("publish not allowed".into());
            }
            if let Some((new_topic, new_payload)) = &self.rewrite_publish {
                *topic = new_topic.clone();
                *payload = new_payload.clone();
            }
            Ok(())
        }

        async fn auth_subscribe(
            &self,
            _session: &Session,
            topics: &mut Vec<String>,
        ) -> Result<(), HookError> {
            self.push(Event::AuthSubscribe(topics.clone()));
            if self.deny_subscribe {
                return Err("subscribe not allowed".into());
            }
            if let Some(filter) = &self.drop_filter {
                topics.retain(|t| t != filter);
            }
            Ok(())
        }
    }

    #[async_trait]
    impl Notifier for Recorder {
        async fn connect(&self, session: &Session) {
            self.push(Event::Connect(session.id.clone()));
        }

        async fn publish(&self, _session: &Session, topic: &str, payload: &Bytes) {
            self.push(Event::Publish(topic.to_owned(), payload.clone()));
            self.published.notify_one();
        }

        async fn subscribe(&self, _session: &Session, topics: &[String]) {
            self.push(Event::Subscribe(topics.to_vec()));
        }

        async fn unsubscribe(&self, _session: &Session, topics: &[String]) {
            self.push(Event::Unsubscribe(topics.to_vec()));
        }

        async fn disconnect(&self, session: &Session) {
            self.push(Event::Disconnect(session.id.clone()));
        }
    }

    /// 测试中扮演客户端或 broker 的一端
    struct Peer {
        reader: PacketReader<ReadHalf<DuplexStream>>,
        writer: WriteHalf<DuplexStream>,
    }

    impl Peer {
        fn new(stream: DuplexStream) -> Self {
            let (read, write) = io::split(stream);
            Self {
                reader: PacketReader::new(read),
                writer: write,
            }
        }

        async fn send(&mut self, packet: Packet) {
            let mut buf = BytesMut::new();
            packet.write(&mut buf).unwrap();
            self.send_raw(&buf).await;
        }

        async fn send_raw(&mut self, bytes: &[u8]) {
            self.writer.write_all(bytes).await.unwrap();
        }

        async fn recv(&mut self) -> Result<Packet, conn::Error> {
            time::timeout(WAIT, self.reader.read_packet())
                .await
                .expect("timed out waiting for packet")
        }
    }

    fn spawn_proxy(
        handler: Arc<Recorder>,
        client_buf: usize,
        broker_buf: usize,
    ) -> (Peer, Peer, JoinHandle<Result<(), Error>>) {
        let (client, inbound) = io::duplex(client_buf);
        let (outbound, broker) = io::duplex(broker_buf);
        let task = tokio::spawn(start(Context::new(), inbound, outbound, handler, None));
        (Peer::new(client), Peer::new(broker), task)
    }

    async fn finish(task: JoinHandle<Result<(), Error>>) -> Result<(), Error> {
        time::timeout(WAIT, task)
            .await
            .expect("proxy did not stop")
            .expect("proxy task panicked")
    }

    fn connect(id: &str) -> Packet {
        Packet::Connect(Connect {
            protocol: Protocol::V4,
            keep_alive: 60,
            client_id: id.into(),
            clean_session: true,
            last_will: None,
            login: Some(Login {
                username: "user".into(),
                password: Some(Bytes::from_static(b"pass")),
            }),
        })
    }

    fn publish(topic: &str, payload: &'static [u8]) -> Packet {
        Packet::Publish(Publish {
            dup: false,
            qos: QoS::AtMostOnce,
            retain: false,
            topic: topic.into(),
            packet_id: None,
            payload: Bytes::from_static(payload),
        })
    }

    fn subscribe(topics: &[&str]) -> Packet {
        Packet::Subscribe(Subscribe {
            packet_id: 1,
            topics: topics.iter().map(|t| t.to_string()).collect(),
            qos: vec![QoS::AtLeastOnce; topics.len()],
        })
    }

    fn unsubscribe(topics: &[&str]) -> Packet {
        Packet::Unsubscribe(Unsubscribe {
            packet_id: 2,
            topics: topics.iter().map(|t| t.to_string()).collect(),
        })
    }

    fn connack() -> Packet {
        Packet::read(&mut BytesMut::from(&[0x20, 0x02, 0x00, 0x00][..])).unwrap()
    }

    /// 完成握手，broker 收到 connect 报文
    async fn connected(client: &mut Peer, broker: &mut Peer, id: &str) {
        client.send(connect(id)).await;
        match broker.recv().await.unwrap() {
            Packet::Connect(connect) => assert_eq!(connect.client_id, id),
            packet => panic!("unexpected packet {:?}", packet),
        }
    }

    #[tokio::test]
    async fn handshake_forwards_connect_and_relays_both_ways() {
        let handler = Arc::new(Recorder::default());
        let (mut client, mut broker, task) = spawn_proxy(handler.clone(), 4096, 4096);

        connected(&mut client, &mut broker, "c1").await;
        broker.send(connack()).await;
        assert_eq!(
            client.recv().await.unwrap().packet_type(),
            PacketType::ConnAck
        );

        // 客户端先关闭
        drop(client);
        finish(task).await.unwrap();
        assert_eq!(
            handler.events(),
            vec![
                Event::AuthConnect("c1".into()),
                Event::Disconnect("c1".into()),
            ]
        );
    }

    #[tokio::test]
    async fn denied_connect_is_downstream_error_with_client_id() {
        let handler = Arc::new(Recorder {
            deny_connect: true,
            ..Default::default()
        });
        let (mut client, mut broker, task) = spawn_proxy(handler.clone(), 4096, 4096);

        client.send(connect("dev1")).await;
        let err = finish(task).await.unwrap_err();
        assert_eq!(err.direction(), Some(Direction::Downstream));
        assert!(matches!(err.reason(), Some(Reason::Denied(_))));
        let message = err.to_string();
        assert_eq!(
            message,
            "failed to proxy from MQTT broker to client with id dev1 with error: banned"
        );

        // connect 报文不会到达 broker，也不会有断开通知
        assert!(broker.recv().await.unwrap_err().is_clean_close());
        assert_eq!(handler.events(), vec![Event::AuthConnect("dev1".into())]);
    }

    #[tokio::test]
    async fn first_packet_must_be_connect() {
        let handler = Arc::new(Recorder::default());
        let (mut client, _broker, task) = spawn_proxy(handler.clone(), 4096, 4096);

        client.send(publish("t", b"x")).await;
        let err = finish(task).await.unwrap_err();
        assert!(matches!(
            err,
            Error::ProtocolViolation(PacketType::Publish)
        ));
        assert!(handler.events().is_empty());
    }

    #[tokio::test]
    async fn closed_before_connect_is_handshake_error() {
        let handler = Arc::new(Recorder::default());
        let (client, _broker, task) = spawn_proxy(handler.clone(), 4096, 4096);

        drop(client);
        let err = finish(task).await.unwrap_err();
        assert!(matches!(err, Error::Handshake(e) if e.is_clean_close()));
        assert!(handler.events().is_empty());
    }

    #[tokio::test]
    async fn broker_gone_during_handshake_is_upstream_error() {
        let handler = Arc::new(Recorder::default());
        let (mut client, broker, task) = spawn_proxy(handler.clone(), 4096, 4096);

        drop(broker);
        client.send(connect("c1")).await;
        let err = finish(task).await.unwrap_err();
        assert_eq!(err.direction(), Some(Direction::Upstream));
        assert!(matches!(err.reason(), Some(Reason::Connection(_))));
        assert!(err.to_string().contains("c1"));
        assert_eq!(handler.events(), vec![Event::AuthConnect("c1".into())]);
    }

    #[tokio::test]
    async fn denied_publish_is_never_forwarded_or_notified() {
        let handler = Arc::new(Recorder {
            deny_topic: Some("t".into()),
            ..Default::default()
        });
        let (mut client, mut broker, task) = spawn_proxy(handler.clone(), 4096, 4096);

        connected(&mut client, &mut broker, "c1").await;
        client.send(publish("t", b"x")).await;

        let err = finish(task).await.unwrap_err();
        assert_eq!(err.direction(), Some(Direction::Upstream));
        let message = err.to_string();
        assert!(message.contains("publish not allowed"), "{}", message);
        assert!(message.contains("c1"), "{}", message);

        // broker 只收到过 connect，随后连接被代理关闭
        assert!(broker.recv().await.unwrap_err().is_clean_close());
        assert_eq!(
            handler.events(),
            vec![
                Event::AuthConnect("c1".into()),
                Event::AuthPublish("t".into()),
                Event::Disconnect("c1".into()),
            ]
        );
    }

    #[tokio::test]
    async fn end_to_end_publish_then_broker_closes() {
        let handler = Arc::new(Recorder::default());
        let (mut client, mut broker, task) = spawn_proxy(handler.clone(), 4096, 4096);

        connected(&mut client, &mut broker, "c1").await;
        client.send(publish("t", b"x")).await;
        assert_eq!(broker.recv().await.unwrap(), publish("t", b"x"));
        time::timeout(WAIT, handler.published.notified())
            .await
            .unwrap();

        // broker 先关闭
        drop(broker);
        finish(task).await.unwrap();
        assert_eq!(
            handler.events(),
            vec![
                Event::AuthConnect("c1".into()),
                Event::AuthPublish("t".into()),
                Event::Publish("t".into(), Bytes::from_static(b"x")),
                Event::Disconnect("c1".into()),
            ]
        );
        assert_eq!(handler.disconnects(), 1);
    }

    #[tokio::test]
    async fn downstream_packets_never_trigger_hooks() {
        let handler = Arc::new(Recorder {
            deny_topic: Some("t".into()),
            deny_subscribe: true,
            ..Default::default()
        });
        let (mut client, mut broker, task) = spawn_proxy(handler.clone(), 4096, 4096);

        connected(&mut client, &mut broker, "c1").await;
        let packets = vec![
            connack(),
            publish("t", b"x"),
            subscribe(&["a/#"]),
            unsubscribe(&["a/#"]),
            connect("other"),
        ];
        for packet in packets.clone() {
            broker.send(packet).await;
        }
        for packet in packets {
            assert_eq!(client.recv().await.unwrap(), packet);
        }

        drop(broker);
        finish(task).await.unwrap();
        assert_eq!(
            handler.events(),
            vec![
                Event::AuthConnect("c1".into()),
                Event::Disconnect("c1".into()),
            ]
        );
    }

    #[tokio::test]
    async fn hooks_rewrite_forwarded_packets() {
        let handler = Arc::new(Recorder {
            rename_user: Some("mapped".into()),
            rewrite_publish: Some(("rewritten/t".into(), Bytes::from_static(b"y"))),
            drop_filter: Some("secret/#".into()),
            ..Default::default()
        });
        let (mut client, mut broker, task) = spawn_proxy(handler.clone(), 4096, 4096);

        client.send(connect("c1")).await;
        match broker.recv().await.unwrap() {
            Packet::Connect(connect) => {
                assert_eq!(
                    connect.login,
                    Some(Login {
                        username: "mapped".into(),
                        password: Some(Bytes::from_static(b"pass")),
                    })
                );
            }
            packet => panic!("unexpected packet {:?}", packet),
        }

        client.send(publish("t", b"x")).await;
        assert_eq!(
            broker.recv().await.unwrap(),
            publish("rewritten/t", b"y")
        );

        client.send(subscribe(&["a/#", "secret/#"])).await;
        match broker.recv().await.unwrap() {
            Packet::Subscribe(subscribe) => {
                assert_eq!(subscribe.topics, vec!["a/#"]);
                assert_eq!(subscribe.qos, vec![QoS::AtLeastOnce]);
            }
            packet => panic!("unexpected packet {:?}", packet),
        }

        drop(client);
        finish(task).await.unwrap();
        let events = handler.events();
        assert!(events.contains(&Event::Publish(
            "rewritten/t".into(),
            Bytes::from_static(b"y")
        )));
        assert!(events.contains(&Event::Subscribe(vec!["a/#".into()])));
    }

    #[tokio::test]
    async fn unsubscribe_is_notified_but_not_authorized() {
        let handler = Arc::new(Recorder {
            deny_subscribe: true,
            ..Default::default()
        });
        let (mut client, mut broker, task) = spawn_proxy(handler.clone(), 4096, 4096);

        connected(&mut client, &mut broker, "c1").await;
        client.send(unsubscribe(&["a/b"])).await;
        assert_eq!(broker.recv().await.unwrap(), unsubscribe(&["a/b"]));

        // 被拒绝的订阅结束会话
        client.send(subscribe(&["a/b"])).await;
        let err = finish(task).await.unwrap_err();
        assert_eq!(err.direction(), Some(Direction::Upstream));
        assert_eq!(
            handler.events(),
            vec![
                Event::AuthConnect("c1".into()),
                Event::Unsubscribe(vec!["a/b".into()]),
                Event::AuthSubscribe(vec!["a/b".into()]),
                Event::Disconnect("c1".into()),
            ]
        );
    }

    #[tokio::test]
    async fn only_connect_inside_relay_is_notified() {
        let handler = Arc::new(Recorder::default());
        let (mut client, mut broker, task) = spawn_proxy(handler.clone(), 4096, 4096);

        // 握手的 connect 只鉴权不通知
        connected(&mut client, &mut broker, "c1").await;
        client.send(connect("again")).await;
        assert_eq!(broker.recv().await.unwrap(), connect("again"));

        drop(client);
        finish(task).await.unwrap();
        assert_eq!(
            handler.events(),
            vec![
                Event::AuthConnect("c1".into()),
                Event::AuthConnect("c1".into()),
                Event::Connect("c1".into()),
                Event::Disconnect("c1".into()),
            ]
        );
    }

    #[tokio::test]
    async fn panicking_hook_ends_session_as_relay_aborted() {
        let handler = Arc::new(Recorder {
            panic_publish: true,
            ..Default::default()
        });
        let (mut client, mut broker, task) = spawn_proxy(handler.clone(), 4096, 4096);

        connected(&mut client, &mut broker, "c1").await;
        client.send(publish("t", b"x")).await;

        // broker 和客户端都没有关闭，会话仍然立即结束
        let err = finish(task).await.unwrap_err();
        assert!(matches!(err, Error::RelayAborted));
        assert!(err.direction().is_none());

        assert!(broker.recv().await.unwrap_err().is_clean_close());
        assert_eq!(
            handler.events(),
            vec![
                Event::AuthConnect("c1".into()),
                Event::AuthPublish("t".into()),
                Event::Disconnect("c1".into()),
            ]
        );
    }

    #[tokio::test]
    async fn close_inside_packet_is_wrapped_error() {
        let handler = Arc::new(Recorder::default());
        let (mut client, mut broker, task) = spawn_proxy(handler.clone(), 4096, 4096);

        connected(&mut client, &mut broker, "c1").await;
        // 只发送半个 publish 报文
        client.send_raw(&[0x30, 0x04, 0x00]).await;
        drop(client);

        let err = finish(task).await.unwrap_err();
        assert_eq!(err.direction(), Some(Direction::Upstream));
        assert!(matches!(
            err.reason(),
            Some(Reason::Connection(conn::Error::ConnectionReset))
        ));
        assert_eq!(handler.disconnects(), 1);
    }

    #[tokio::test]
    async fn blocked_downstream_does_not_delay_upstream() {
        let handler = Arc::new(Recorder::default());
        // 客户端不读取数据，下行很快就会写满
        let (mut client, mut broker, task) = spawn_proxy(handler.clone(), 64, 4096);

        connected(&mut client, &mut broker, "c1").await;
        for _ in 0..10 {
            broker.send(publish("down", &[0u8; 100])).await;
        }
        time::sleep(Duration::from_millis(50)).await;

        client.send(publish("up", b"x")).await;
        assert_eq!(broker.recv().await.unwrap(), publish("up", b"x"));

        drop(client);
        drop(broker);
        let _ = finish(task).await;
        assert_eq!(handler.disconnects(), 1);
    }

    #[tokio::test]
    async fn blocked_upstream_does_not_delay_downstream() {
        let handler = Arc::new(Recorder::default());
        // broker 不读取数据，上行很快就会写满
        let (mut client, mut broker, task) = spawn_proxy(handler.clone(), 4096, 64);

        connected(&mut client, &mut broker, "c1").await;
        for _ in 0..10 {
            client.send(publish("up", &[0u8; 100])).await;
        }
        time::sleep(Duration::from_millis(50)).await;

        broker.send(publish("down", b"x")).await;
        assert_eq!(client.recv().await.unwrap(), publish("down", b"x"));

        drop(client);
        drop(broker);
        let _ = finish(task).await;
        assert_eq!(handler.disconnects(), 1);
    }

    #[test]
    fn write_back_keeps_absent_credentials_absent() {
        let mut packet = Connect {
            protocol: Protocol::V4,
            keep_alive: 60,
            client_id: "c1".into(),
            clean_session: true,
            last_will: None,
            login: None,
        };
        let session = session_from_connect(&packet, None);
        assert_eq!(session.username, "");
        assert!(session.password.is_empty());

        write_back(&session, &mut packet);
        assert_eq!(packet.login, None);

        let session = Session {
            id: "renamed".into(),
            username: "u".into(),
            ..session
        };
        write_back(&session, &mut packet);
        assert_eq!(packet.client_id, "renamed");
        assert_eq!(
            packet.login,
            Some(Login {
                username: "u".into(),
                password: None,
            })
        );
    }

    #[test]
    fn wrap_falls_back_to_unknown_client() {
        let err = Direction::Downstream.wrap(&Context::new(), conn::Error::ConnectionReset);
        assert_eq!(
            err.to_string(),
            "failed to proxy from MQTT broker to client with id unknown with error: Connection reset by peer"
        );

        let ctx = Context::new().with_session(Session {
            id: "c9".into(),
            ..Default::default()
        });
        let err = Direction::Upstream.wrap(&ctx, conn::Error::ConnectionReset);
        assert_eq!(
            err.to_string(),
            "failed to proxy from MQTT client with id c9 to MQTT broker with error: Connection reset by peer"
        );
    }
}
