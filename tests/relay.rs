use framechat::{
    client,
    message::{Message, MessageCodec},
    server::{Server, DEFAULT_QUEUE_CAPACITY},
};
use futures::{SinkExt, StreamExt};
use std::{net::SocketAddr, time::Duration};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
    sync::mpsc,
    time::timeout,
};
use tokio_util::codec::Framed;

type Peer = Framed<TcpStream, MessageCodec>;

async fn start_server() -> SocketAddr {
    let server = Server::bind("127.0.0.1:0", DEFAULT_QUEUE_CAPACITY)
        .await
        .unwrap();
    let addr = server.local_addr().unwrap();
    tokio::spawn(server.run());
    addr
}

async fn join(addr: SocketAddr) -> Peer {
    Framed::new(TcpStream::connect(addr).await.unwrap(), MessageCodec::new())
}

async fn say(peer: &mut Peer, body: &str) {
    peer.send(Message::new(body.as_bytes())).await.unwrap();
}

async fn hear(peer: &mut Peer) -> String {
    let message = timeout(Duration::from_secs(5), peer.next())
        .await
        .expect("timed out waiting for a message")
        .expect("connection closed")
        .unwrap();
    String::from_utf8(message.body().to_vec()).unwrap()
}

#[tokio::test]
async fn single_client_hears_itself() {
    let addr = start_server().await;
    let mut stream = TcpStream::connect(addr).await.unwrap();

    stream.write_all(b"   5hello").await.unwrap();

    let mut echoed = [0; 9];
    timeout(Duration::from_secs(5), stream.read_exact(&mut echoed))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(&echoed, b"   5hello");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn two_clients_fan_out() {
    let addr = start_server().await;
    let mut a = join(addr).await;
    let mut b = join(addr).await;

    say(&mut a, "one").await;
    assert_eq!(hear(&mut a).await, "one");
    assert_eq!(hear(&mut b).await, "one");

    say(&mut b, "two").await;
    assert_eq!(hear(&mut a).await, "two");
    assert_eq!(hear(&mut b).await, "two");
}

#[tokio::test]
async fn late_joiner_gets_history_first() {
    let addr = start_server().await;
    let mut a = join(addr).await;
    for body in ["m1", "m2", "m3"] {
        say(&mut a, body).await;
    }
    for body in ["m1", "m2", "m3"] {
        assert_eq!(hear(&mut a).await, body);
    }

    let mut b = join(addr).await;
    for body in ["m1", "m2", "m3"] {
        assert_eq!(hear(&mut b).await, body);
    }

    say(&mut a, "live").await;
    assert_eq!(hear(&mut b).await, "live");
}

#[tokio::test]
async fn history_is_capped_at_one_hundred() {
    let addr = start_server().await;
    let mut a = join(addr).await;
    for i in 1..=150 {
        say(&mut a, &format!("m{i}")).await;
    }
    for i in 1..=150 {
        assert_eq!(hear(&mut a).await, format!("m{i}"));
    }

    let mut b = join(addr).await;
    for i in 51..=150 {
        assert_eq!(hear(&mut b).await, format!("m{i}"));
    }

    say(&mut a, "live").await;
    assert_eq!(hear(&mut b).await, "live");
}

#[tokio::test]
async fn oversize_header_closes_only_that_connection() {
    let addr = start_server().await;
    let mut bystander = join(addr).await;

    let mut rogue = TcpStream::connect(addr).await.unwrap();
    rogue.write_all(b" 600").await.unwrap();
    // The server may already have closed; the body write is allowed to fail.
    let _ = rogue.write_all(&[b'x'; 600]).await;

    let mut buffer = [0; 16];
    let closed = timeout(Duration::from_secs(5), rogue.read(&mut buffer))
        .await
        .expect("rogue connection was not closed");
    assert!(matches!(closed, Ok(0) | Err(_)));

    say(&mut bystander, "still here").await;
    assert_eq!(hear(&mut bystander).await, "still here");
}

#[tokio::test]
async fn sender_disconnect_leaves_others_working() {
    let addr = start_server().await;
    let mut b = TcpStream::connect(addr).await.unwrap();

    let mut a = join(addr).await;
    say(&mut a, "hi").await;
    assert_eq!(hear(&mut a).await, "hi");
    drop(a);

    let mut received = [0; 6];
    timeout(Duration::from_secs(5), b.read_exact(&mut received))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(&received, b"   2hi");

    let mut c = join(addr).await;
    assert_eq!(hear(&mut c).await, "hi");
    say(&mut c, "hello c").await;
    assert_eq!(hear(&mut c).await, "hello c");
}

#[tokio::test]
async fn client_posts_writes_and_surfaces_replies() {
    let addr = start_server().await;
    let stream = client::connect("127.0.0.1", addr.port()).await.unwrap();
    let (reader, writer) = stream.into_split();

    let (client, commands) = client::channel();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let io = tokio::spawn(client::run(reader, writer, commands, move |message| {
        let _ = tx.send(message);
    }));

    let producer = client.clone();
    std::thread::spawn(move || {
        producer.write(Message::new(b"hello")).unwrap();
        producer.write(Message::new(b"world")).unwrap();
    })
    .join()
    .unwrap();

    for expected in [&b"hello"[..], b"world"] {
        let message = timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(message.body(), expected);
    }

    client.close().unwrap();
    timeout(Duration::from_secs(5), io)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn client_connect_failure_is_an_error() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    assert!(client::connect("127.0.0.1", port).await.is_err());
}
