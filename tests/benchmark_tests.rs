//! Performance benchmarks for the relay's hot paths

use server::broadcast::BroadcastRouter;
use server::connection::{Connection, ConnectionOptions};
use server::registry::ClientRegistry;
use shared::{ChatMessage, TranscriptStore, SERVER_TRANSCRIPT_PREFIX};
use std::sync::Arc;
use std::time::Instant;
use tokio::io::{duplex, AsyncBufReadExt, BufReader};

/// Benchmarks broadcast fan-out to many in-memory clients
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn benchmark_broadcast_fanout() {
    let clients = 32;
    let messages = 1_000;

    let router = BroadcastRouter::new(
        ClientRegistry::shared(),
        Arc::new(TranscriptStore::new(SERVER_TRANSCRIPT_PREFIX)),
    );

    let mut connections = Vec::new();
    let mut readers = Vec::new();
    for id in 1..=clients {
        let (local, remote) = duplex(64 * 1024);
        let (reader, writer) = tokio::io::split(local);
        let conn = Connection::new(id, reader, writer, ConnectionOptions::default());
        router.registry().write().await.register(conn.handle()).unwrap();
        connections.push(conn);

        readers.push(tokio::spawn(async move {
            let mut lines = BufReader::new(remote).lines();
            let mut received = 0;
            while received < messages {
                match lines.next_line().await {
                    Ok(Some(_)) => received += 1,
                    _ => break,
                }
            }
            received
        }));
    }

    let start = Instant::now();
    for n in 0..messages {
        let line = ChatMessage::Chat {
            id: (n % clients) + 1,
            text: format!("message {}", n),
        }
        .to_string();
        router.broadcast(&line).await;
    }
    for reader in readers {
        assert_eq!(reader.await.unwrap(), messages);
    }
    let duration = start.elapsed();

    println!(
        "Broadcast fan-out: {} messages to {} clients in {:?} ({:.2} μs/message)",
        messages,
        clients,
        duration,
        duration.as_micros() as f64 / messages as f64
    );

    assert_eq!(router.transcript().len(), messages as usize);
    // Should complete in under 5 seconds
    assert!(duration.as_secs() < 5);
}

/// Benchmarks transcript appends from several threads
#[test]
fn benchmark_transcript_append() {
    let store = Arc::new(TranscriptStore::new(SERVER_TRANSCRIPT_PREFIX));
    let threads = 4;
    let per_thread = 25_000;

    let start = Instant::now();
    let handles: Vec<_> = (0..threads)
        .map(|t| {
            let store = Arc::clone(&store);
            std::thread::spawn(move || {
                for n in 0..per_thread {
                    store.append(format!("User {}: line {}", t, n));
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    let duration = start.elapsed();

    println!(
        "Transcript append: {} lines in {:?} ({:.2} ns/line)",
        threads * per_thread,
        duration,
        duration.as_nanos() as f64 / (threads * per_thread) as f64
    );

    assert_eq!(store.len(), threads * per_thread);
    // Should complete in under 1 second
    assert!(duration.as_millis() < 1000);
}

/// Benchmarks flushing a large transcript to disk
#[test]
fn benchmark_transcript_flush() {
    let temp = tempfile::tempdir().unwrap();
    let store = TranscriptStore::new(SERVER_TRANSCRIPT_PREFIX);
    for n in 0..50_000 {
        store.append(format!("User {}: the quick brown fox {}", n % 16, n));
    }

    let start = Instant::now();
    let path = store.flush(temp.path()).unwrap().unwrap();
    let duration = start.elapsed();

    println!("Transcript flush: 50000 lines in {:?}", duration);

    assert_eq!(std::fs::read_to_string(path).unwrap().lines().count(), 50_000);
    // Should complete in under 2 seconds
    assert!(duration.as_millis() < 2000);
}
