use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::io::{AsyncRead, ReadBuf};
use tokio::sync::mpsc;

use shardline::error::AgentError;
use shardline::storage::ShardStore;
use tempfile::TempDir;

/// Reader that yields each chunk received on a channel and ends when the
/// sender is dropped, so a test controls how long a write stays open.
struct ChannelReader {
    rx: mpsc::UnboundedReceiver<Vec<u8>>,
    pending: Vec<u8>,
}

impl ChannelReader {
    fn new() -> (mpsc::UnboundedSender<Vec<u8>>, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            tx,
            Self {
                rx,
                pending: Vec::new(),
            },
        )
    }
}

impl AsyncRead for ChannelReader {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        while self.pending.is_empty() {
            match self.rx.poll_recv(cx) {
                Poll::Ready(Some(chunk)) => self.pending = chunk,
                Poll::Ready(None) => return Poll::Ready(Ok(())),
                Poll::Pending => return Poll::Pending,
            }
        }
        let n = self.pending.len().min(buf.remaining());
        buf.put_slice(&self.pending[..n]);
        self.pending.drain(..n);
        Poll::Ready(Ok(()))
    }
}

fn test_store(port: u16) -> (TempDir, ShardStore) {
    let temp = TempDir::new().unwrap();
    let store = ShardStore::new(temp.path(), port);
    (temp, store)
}

#[tokio::test]
async fn test_writes_append_in_order() {
    let (_temp, store) = test_store(9000);

    store.write("words@0", b"hello ").await.unwrap();
    store.write("words@0", b"world").await.unwrap();

    assert_eq!(store.read("words@0", 0).await.unwrap(), b"hello world");
    assert_eq!(store.len("words@0").await.unwrap(), 11);
}

#[tokio::test]
async fn test_read_from_offset() {
    let (_temp, store) = test_store(9000);
    store.write("s", b"0123456789").await.unwrap();

    assert_eq!(store.read("s", 4).await.unwrap(), b"456789");
    assert_eq!(store.read("s", 9).await.unwrap(), b"9");
}

#[tokio::test]
async fn test_read_at_or_past_end_is_empty() {
    let (_temp, store) = test_store(9000);
    store.write("s", b"abc").await.unwrap();

    assert!(store.read("s", 3).await.unwrap().is_empty());
    assert!(store.read("s", 1000).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_read_missing_shard() {
    let (_temp, store) = test_store(9000);

    let result = store.read("absent", 0).await;
    assert!(matches!(result, Err(AgentError::ShardNotFound(name)) if name == "absent"));
}

#[tokio::test]
async fn test_file_name_carries_port() {
    let (temp, store) = test_store(9123);
    store.write("logs@3", b"x").await.unwrap();

    assert!(temp.path().join("logs@3-9123.dat").is_file());
}

#[tokio::test]
async fn test_invalid_names_rejected() {
    let (_temp, store) = test_store(9000);

    for name in ["", "..", "a/b", "a\\b"] {
        let result = store.write(name, b"x").await;
        assert!(
            matches!(result, Err(AgentError::InvalidShardName(_))),
            "name {name:?} should be rejected"
        );
    }
}

#[tokio::test]
async fn test_cleanup_removes_only_own_port() {
    let (temp, store) = test_store(9000);
    let other = ShardStore::new(temp.path(), 9001);

    store.write("x", b"1").await.unwrap();
    store.write("y", b"2").await.unwrap();
    other.write("z", b"3").await.unwrap();
    std::fs::create_dir(temp.path().join("nested-9000.dat")).unwrap();

    let removed = store.cleanup(9000).await.unwrap();

    assert_eq!(removed, 2);
    assert!(!temp.path().join("x-9000.dat").exists());
    assert!(!temp.path().join("y-9000.dat").exists());
    assert!(temp.path().join("z-9001.dat").exists());
    assert!(temp.path().join("nested-9000.dat").is_dir());
}

#[tokio::test]
async fn test_delete() {
    let (_temp, store) = test_store(9000);
    store.write("s", b"abc").await.unwrap();

    assert!(store.delete("s").await.unwrap());
    assert!(!store.delete("s").await.unwrap());
    assert!(matches!(
        store.len("s").await,
        Err(AgentError::ShardNotFound(_))
    ));
}

#[tokio::test]
async fn test_concurrent_writes_same_shard_do_not_interleave() {
    let (_temp, store) = test_store(9000);
    let store = Arc::new(store);

    let chunk_len = 64 * 1024;
    let mut tasks = Vec::new();
    for i in 0..8u8 {
        let store = store.clone();
        tasks.push(tokio::spawn(async move {
            let chunk = vec![b'a' + i; chunk_len];
            store.write("shared", &chunk).await.unwrap();
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    let data = store.read("shared", 0).await.unwrap();
    assert_eq!(data.len(), 8 * chunk_len);

    let mut seen = Vec::new();
    for block in data.chunks(chunk_len) {
        let first = block[0];
        assert!(block.iter().all(|&b| b == first), "writes interleaved");
        seen.push(first);
    }
    seen.sort_unstable();
    seen.dedup();
    assert_eq!(seen.len(), 8);
}

#[tokio::test]
async fn test_concurrent_writes_distinct_shards() {
    let (_temp, store) = test_store(9000);
    let store = Arc::new(store);

    let mut tasks = Vec::new();
    for i in 0..16 {
        let store = store.clone();
        tasks.push(tokio::spawn(async move {
            let name = format!("part@{i}");
            store.write(&name, name.as_bytes()).await.unwrap();
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    for i in 0..16 {
        let name = format!("part@{i}");
        assert_eq!(store.read(&name, 0).await.unwrap(), name.as_bytes());
    }
}

#[tokio::test]
async fn test_delete_does_not_let_queued_writers_interleave() {
    let (_temp, store) = test_store(9000);
    let store = Arc::new(store);

    // A slow write holds the shard open while others queue behind it.
    let (feed, reader) = ChannelReader::new();
    let slow = {
        let store = store.clone();
        tokio::spawn(async move {
            let mut reader = reader;
            store.write_from("shared", &mut reader).await.unwrap()
        })
    };
    feed.send(vec![b'a'; 1024]).unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;

    let delete = {
        let store = store.clone();
        tokio::spawn(async move { store.delete("shared").await.unwrap() })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;

    // Queued behind the delete; must not start while the slow write is open.
    let queued = {
        let store = store.clone();
        tokio::spawn(async move { store.write("shared", &[b'b'; 1024]).await.unwrap() })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!delete.is_finished());
    assert!(!queued.is_finished(), "write ran while another held the shard");

    feed.send(vec![b'a'; 1024]).unwrap();
    drop(feed);
    assert_eq!(slow.await.unwrap(), 2048);
    assert!(delete.await.unwrap());
    assert_eq!(queued.await.unwrap(), 1024);

    assert_eq!(store.read("shared", 0).await.unwrap(), vec![b'b'; 1024]);
}

#[tokio::test]
async fn test_writes_racing_deletes_stay_contiguous() {
    let (_temp, store) = test_store(9000);
    let store = Arc::new(store);

    let chunk_len = 32 * 1024;
    let mut tasks = Vec::new();
    for i in 0..16u8 {
        let store = store.clone();
        tasks.push(tokio::spawn(async move {
            if i % 4 == 3 {
                store.delete("shared").await.unwrap();
            } else {
                store.write("shared", &vec![b'a' + i; chunk_len]).await.unwrap();
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    let data = store.read("shared", 0).await.unwrap_or_default();
    assert_eq!(data.len() % chunk_len, 0);
    for block in data.chunks(chunk_len) {
        assert!(block.iter().all(|&b| b == block[0]), "writes interleaved");
    }
}

#[tokio::test]
async fn test_idle_shard_locks_are_evicted() {
    let (_temp, store) = test_store(9000);
    let store = Arc::new(store);

    let mut tasks = Vec::new();
    for i in 0..32 {
        let store = store.clone();
        tasks.push(tokio::spawn(async move {
            let name = format!("part@{}", i % 4);
            store.write(&name, b"x").await.unwrap();
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }
    assert_eq!(store.tracked_locks(), 0);

    store.write("once", b"x").await.unwrap();
    store.delete("once").await.unwrap();
    store.delete("never-written").await.unwrap();
    assert_eq!(store.tracked_locks(), 0);
}
