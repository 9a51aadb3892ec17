//! Black-box integration tests driving `Client` against loopback TCP/UDP
//! servers, exercising only the public `bcap_client` API.

use std::net::{TcpListener, UdpSocket};
use std::thread;
use std::time::Duration;

use bcap_client::{Client, Response};
use bcap_proto::error::hresult;
use bcap_proto::{deserialize_datagram, deserialize_stream, serialize_datagram, serialize_stream, Value};
use std::io::{Read, Write};

#[test]
fn tcp_client_round_trips_a_call_against_a_loopback_server() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    thread::spawn(move || {
        let (mut socket, _) = listener.accept().unwrap();
        let mut buf = vec![0u8; 4096];
        let n = socket.read(&mut buf).unwrap();
        let decoded = deserialize_stream(&buf[..n]).unwrap();
        let response =
            serialize_stream(decoded.serial, 1, 0, &[Value::I4(42)], None).unwrap();
        socket.write_all(&response).unwrap();
    });

    let client = Client::new("tcp", false).unwrap();
    client.connect(&addr.to_string(), Duration::from_secs(2), 1).unwrap();

    let response = client.request(3, &[Value::Bstr("hi".into())]).unwrap();
    assert_eq!(response, Response::Value(Value::I4(42)));
}

#[test]
fn udp_client_retries_then_succeeds() {
    let server = UdpSocket::bind("127.0.0.1:0").unwrap();
    let addr = server.local_addr().unwrap();
    thread::spawn(move || {
        // Drop the first datagram on the floor; respond to the second.
        let mut buf = [0u8; 512];
        let _ = server.recv_from(&mut buf).unwrap();
        let (n, from) = server.recv_from(&mut buf).unwrap();
        let decoded = deserialize_datagram(&buf[..n]).unwrap();
        let response = serialize_datagram(decoded.serial, 1, 0, &[Value::I4(7)]).unwrap();
        server.send_to(&response, from).unwrap();
    });

    let client = Client::new("udp", false).unwrap();
    client.connect(&addr.to_string(), Duration::from_millis(200), 3).unwrap();

    let response = client.request(3, &[]).unwrap();
    assert_eq!(response, Response::Value(Value::I4(7)));
}

#[test]
fn should_return_hr_policy_is_selected_at_construction() {
    let server = UdpSocket::bind("127.0.0.1:0").unwrap();
    let addr = server.local_addr().unwrap();
    thread::spawn(move || {
        let mut buf = [0u8; 512];
        let (n, from) = server.recv_from(&mut buf).unwrap();
        let decoded = deserialize_datagram(&buf[..n]).unwrap();
        let response =
            serialize_datagram(decoded.serial, 0, hresult::E_FAIL, &[]).unwrap();
        server.send_to(&response, from).unwrap();
    });

    let client = Client::new("udp", true).unwrap();
    client.connect(&addr.to_string(), Duration::from_secs(2), 1).unwrap();

    let response = client.request(3, &[]).unwrap();
    assert_eq!(response, Response::WithStatus(hresult::E_FAIL, Value::Empty));
}

#[test]
fn disconnect_is_idempotent_and_never_panics() {
    let client = Client::new("tcp", false).unwrap();
    client.disconnect();
    client.disconnect();
}

#[test]
fn unknown_transport_selector_is_rejected_before_any_io() {
    assert!(Client::new("carrier-pigeon", false).is_err());
}
