use std::time::Duration;

use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt, BufReader, DuplexStream};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};

use broadcast_relay::{Client, Console, RelayConfig, RelayError, Server, ServerHandle};

const WAIT: Duration = Duration::from_secs(3);

async fn start_relay() -> (ServerHandle, String, JoinHandle<Result<(), RelayError>>) {
    let config = RelayConfig {
        port: 0,
        ..RelayConfig::default()
    };
    let server = Server::bind(&config).await.expect("bind loopback");
    let addr = server.local_addr().to_string();
    let handle = server.handle();
    let run = tokio::spawn(server.run());
    (handle, addr, run)
}

async fn wait_for_clients(handle: &ServerHandle, count: usize) {
    timeout(WAIT, async {
        while handle.registry().len().await != count {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("registry never reached expected size");
}

async fn read_text(stream: &mut TcpStream) -> String {
    let mut buf = [0u8; 1024];
    let n = timeout(WAIT, stream.read(&mut buf))
        .await
        .expect("read timed out")
        .expect("read failed");
    String::from_utf8_lossy(&buf[..n]).into_owned()
}

#[tokio::test]
async fn relay_scenario_hello_exit_ping() {
    let (handle, addr, run) = start_relay().await;

    let mut alice = TcpStream::connect(&addr).await.unwrap();
    let alice_addr = alice.local_addr().unwrap().to_string();
    let mut bob = TcpStream::connect(&addr).await.unwrap();
    wait_for_clients(&handle, 2).await;

    alice.write_all(b"hello").await.unwrap();
    assert_eq!(read_text(&mut bob).await, format!("{alice_addr}: hello"));
    assert_eq!(read_text(&mut alice).await, "me: hello");

    // Exit is not relayed; Alice's connection is released
    alice.write_all(b"exit").await.unwrap();
    assert_eq!(read_text(&mut alice).await, "");
    wait_for_clients(&handle, 1).await;

    bob.write_all(b"ping").await.unwrap();
    assert_eq!(read_text(&mut bob).await, "me: ping");

    assert!(handle.stop().await);
    timeout(WAIT, run).await.unwrap().unwrap().unwrap();
    assert_eq!(read_text(&mut bob).await, "");
}

#[tokio::test]
async fn every_client_gets_each_message_intact() {
    let (handle, addr, _run) = start_relay().await;

    let mut clients = Vec::new();
    for _ in 0..4 {
        clients.push(TcpStream::connect(&addr).await.unwrap());
    }
    wait_for_clients(&handle, 4).await;

    let sender_addr = clients[2].local_addr().unwrap().to_string();
    clients[2].write_all(b"fan out").await.unwrap();

    for (i, client) in clients.iter_mut().enumerate() {
        let expected = if i == 2 {
            "me: fan out".to_string()
        } else {
            format!("{sender_addr}: fan out")
        };
        assert_eq!(read_text(client).await, expected);
    }

    handle.stop().await;
}

#[tokio::test]
async fn dropped_client_stops_receiving() {
    let (handle, addr, _run) = start_relay().await;

    let alice = TcpStream::connect(&addr).await.unwrap();
    let mut bob = TcpStream::connect(&addr).await.unwrap();
    wait_for_clients(&handle, 2).await;

    drop(alice);
    wait_for_clients(&handle, 1).await;

    bob.write_all(b"anyone?").await.unwrap();
    assert_eq!(read_text(&mut bob).await, "me: anyone?");

    handle.stop().await;
}

async fn read_screen_until(screen: &mut DuplexStream, needle: &str) -> String {
    let mut seen = String::new();
    let mut buf = [0u8; 1024];
    while !seen.contains(needle) {
        let n = timeout(WAIT, screen.read(&mut buf)).await.unwrap().unwrap();
        assert!(n > 0, "screen closed before {needle:?}");
        seen.push_str(&String::from_utf8_lossy(&buf[..n]));
    }
    seen
}

#[tokio::test]
async fn interactive_client_round_trip() {
    let (handle, addr, _run) = start_relay().await;
    let port = addr.rsplit(':').next().unwrap().parse().unwrap();
    let config = RelayConfig {
        port,
        ..RelayConfig::default()
    };

    let (input, mut keyboard) = duplex(1024);
    let (out, mut screen) = duplex(4096);
    let (client, status) = Client::connect(&config, BufReader::new(input), Console::new(out))
        .await
        .unwrap();
    wait_for_clients(&handle, 1).await;

    keyboard.write_all(b"hi there\n").await.unwrap();
    read_screen_until(&mut screen, "me: hi there").await;

    // Server stop reaches the client as a clean close
    handle.stop().await;
    timeout(WAIT, status).await.unwrap().unwrap();
    read_screen_until(&mut screen, "disconnected from the server").await;

    assert!(client.stop().await);
    assert!(!client.stop().await);
}

#[tokio::test]
async fn client_reports_dial_failure() {
    let (handle, addr, run) = start_relay().await;
    handle.stop().await;
    timeout(WAIT, run).await.unwrap().unwrap().unwrap();

    let port = addr.rsplit(':').next().unwrap().parse().unwrap();
    let config = RelayConfig {
        port,
        ..RelayConfig::default()
    };
    let (input, _keyboard) = duplex(64);
    let (out, _screen) = duplex(64);

    let result = Client::connect(&config, BufReader::new(input), Console::new(out)).await;
    assert!(matches!(result, Err(RelayError::Connect { .. })));
}
