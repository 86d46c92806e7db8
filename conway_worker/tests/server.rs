use std::sync::Arc;
use std::time::Duration;

use conway::codec;
use conway::rpc::{self, Response};
use conway::{Client, ConwayStep, ErrorKind, Grid, Method, SimulationParams, StateConflict, StepFunction, patterns};
use conway_worker::{ControlService, Engine};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

/// Conway's rule with a fixed delay per turn, so turns are slow enough to
/// pause between.
struct SlowStep(Duration);

impl StepFunction for SlowStep {
    fn step(&self, grid: &Grid, threads: usize) -> Grid {
        std::thread::sleep(self.0);
        ConwayStep.step(grid, threads)
    }
}

async fn start_worker(step: SlowStep) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    let service = ControlService::new(Arc::new(Engine::with_step(step)));
    tokio::spawn(conway_worker::serve(listener, service));
    addr
}

async fn turn(client: &Client) -> u64 {
    client.call(Method::GetTurn, "").await.unwrap().parse().unwrap()
}

async fn wait_for_turn_above(client: &Client, floor: u64) -> u64 {
    for _ in 0..500 {
        let now = turn(client).await;
        if now > floor {
            return now;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("turn never passed {floor}");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_queries_and_control_during_long_computation() {
    let addr = start_worker(SlowStep(Duration::from_millis(5))).await;
    let client = Client::connect(&addr).await.unwrap();

    let grid = patterns::random_grid(32, 32, 1);
    let params = SimulationParams::new(32, 32, 1_000_000);
    let ack = client
        .call(Method::LoadInitialState, codec::encode_initial(&grid, &params))
        .await
        .unwrap();
    assert_eq!(ack, codec::ACK);

    let compute = client.go(Method::ComputeTurns, "1000000");
    wait_for_turn_above(&client, 0).await;

    client.call(Method::Pause, "").await.unwrap();
    let err = client.call(Method::Pause, "").await.unwrap_err();
    assert_eq!(err.conflict(), Some(StateConflict::AlreadyPaused));

    tokio::time::sleep(Duration::from_millis(30)).await;
    let first_count = client.call(Method::GetCellCount, "").await.unwrap();
    let first_snapshot = client.call(Method::GetSnapshot, "").await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    let second_count = client.call(Method::GetCellCount, "").await.unwrap();
    let second_snapshot = client.call(Method::GetSnapshot, "").await.unwrap();
    assert_eq!(first_count, second_count);
    assert_eq!(first_snapshot, second_snapshot);

    let paused_at = codec::decode_snapshot(&first_snapshot).unwrap();
    let (count_turn, alive) = codec::decode_cell_count(&first_count).unwrap();
    assert_eq!(count_turn, paused_at.turn);
    assert_eq!(alive, paused_at.alive_count());

    // A new run cannot be loaded over the active one
    let err = client
        .call(Method::LoadInitialState, codec::encode_initial(&grid, &params))
        .await
        .unwrap_err();
    assert_eq!(err.conflict(), Some(StateConflict::AlreadyComputing));
    assert_eq!(client.call(Method::GetSnapshot, "").await.unwrap(), first_snapshot);

    client.call(Method::Resume, "").await.unwrap();
    wait_for_turn_above(&client, paused_at.turn).await;

    client.call(Method::Stop, "").await.unwrap();
    let finished = codec::decode_snapshot(&compute.await.unwrap()).unwrap();
    assert!(finished.turn > paused_at.turn);
    assert!(finished.turn < 1_000_000);

    let last = codec::decode_snapshot(&client.call(Method::GetSnapshot, "").await.unwrap()).unwrap();
    assert_eq!(last, finished);

    client.close().await;
}

#[tokio::test]
async fn test_compute_reaches_requested_turn() {
    let addr = start_worker(SlowStep(Duration::ZERO)).await;
    let client = Client::connect(&addr).await.unwrap();

    let grid = Grid::with_alive(4, 4, &[(0, 1), (1, 1), (2, 1)]);
    let params = SimulationParams::new(4, 4, 2);
    client
        .call(Method::LoadInitialState, codec::encode_initial(&grid, &params))
        .await
        .unwrap();

    let reply = client.call(Method::ComputeTurns, "2").await.unwrap();
    let snapshot = codec::decode_snapshot(&reply).unwrap();
    assert_eq!(snapshot.turn, 2);
    assert_eq!(*snapshot.grid, grid);
    assert_eq!(client.call(Method::GetCellCount, "").await.unwrap(), "2,3");

    let err = client.call(Method::ComputeTurns, "two").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Protocol);

    client.close().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_stop_sent_right_after_compute_is_honoured() {
    let addr = start_worker(SlowStep(Duration::from_millis(1))).await;
    let client = Client::connect(&addr).await.unwrap();
    let grid = patterns::random_grid(8, 8, 4);
    let params = SimulationParams::new(8, 8, 400);

    for _ in 0..10 {
        client
            .call(Method::LoadInitialState, codec::encode_initial(&grid, &params))
            .await
            .unwrap();
        let compute = client.go(Method::ComputeTurns, "400");
        client.call(Method::Stop, "").await.unwrap();
        let stopped = codec::decode_snapshot(&compute.await.unwrap()).unwrap();
        assert!(stopped.turn <= 1, "ran to turn {} after stop", stopped.turn);
    }

    client.close().await;
}

#[tokio::test]
async fn test_compute_before_load_is_refused() {
    let addr = start_worker(SlowStep(Duration::ZERO)).await;
    let client = Client::connect(&addr).await.unwrap();
    let err = client.call(Method::ComputeTurns, "5").await.unwrap_err();
    assert_eq!(err.conflict(), Some(StateConflict::NoDataLoaded));
    client.close().await;
}

#[tokio::test]
async fn test_garbage_envelope_gets_protocol_error() {
    let addr = start_worker(SlowStep(Duration::ZERO)).await;
    let stream = TcpStream::connect(&addr).await.unwrap();
    let (read_half, mut write_half) = stream.into_split();

    write_half.write_all(b"this is not json\n").await.unwrap();
    let mut lines = BufReader::new(read_half).lines();
    let line = lines.next_line().await.unwrap().unwrap();
    let response: Response = rpc::parse_frame(&line).unwrap();
    assert_eq!(response.id, 0);
    assert_eq!(response.into_result().unwrap_err().kind(), ErrorKind::Protocol);

    // The connection is still usable afterwards
    write_half
        .write_all(b"{\"id\":3,\"method\":\"GetTurn\",\"message\":\"\"}\n")
        .await
        .unwrap();
    let line = lines.next_line().await.unwrap().unwrap();
    let response: Response = rpc::parse_frame(&line).unwrap();
    assert_eq!(response.id, 3);
    assert_eq!(response.into_result().unwrap(), "0");
}
