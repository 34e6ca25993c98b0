//! Property-based tests for stores and framing
//!
//! Run with: cargo test --test proptest_roundtrip

use gitkit::fs::path::normalize_path;
use gitkit::protocol::pktline::{self, MAX_PAYLOAD_LEN, PktLine, PktLineReader};
use gitkit::{FileSystem, PersistentStore, VolatileStore};
use proptest::prelude::*;

// Up to four segments of lowercase names, no empty or dot segments
fn path_strategy() -> impl Strategy<Value = String> {
    proptest::collection::vec("[a-z][a-z0-9_]{0,7}", 1..5).prop_map(|segments| segments.join("/"))
}

fn content_strategy() -> impl Strategy<Value = Vec<u8>> {
    proptest::collection::vec(any::<u8>(), 0..2048)
}

fn block_on<F: std::future::Future>(future: F) -> F::Output {
    thread_local! {
        static RT: tokio::runtime::Runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
    }
    RT.with(|rt| rt.block_on(future))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Bytes written are the bytes read, in both stores
    #[test]
    fn write_read_roundtrip(path in path_strategy(), content in content_strategy()) {
        let (volatile, persistent) = block_on(async {
            let volatile = VolatileStore::new();
            volatile.write_file(&path, &content).await.unwrap();

            let persistent = PersistentStore::open_in_memory().unwrap();
            persistent.write_file(&path, &content).await.unwrap();

            (
                volatile.read_file(&path).await.unwrap(),
                persistent.read_file(&path).await.unwrap(),
            )
        });
        prop_assert_eq!(&volatile, &content);
        prop_assert_eq!(&persistent, &content);
    }

    /// Every ancestor of a written file is a directory
    #[test]
    fn ancestors_become_directories(path in path_strategy()) {
        let all_dirs = block_on(async {
            let fs = PersistentStore::open_in_memory().unwrap();
            fs.write_file(&path, b"x").await.unwrap();

            let mut prefix = String::new();
            let segments: Vec<&str> = path.split('/').collect();
            let mut ok = true;
            for segment in &segments[..segments.len() - 1] {
                if !prefix.is_empty() {
                    prefix.push('/');
                }
                prefix.push_str(segment);
                ok &= fs.stat(&prefix).await.unwrap().is_dir();
            }
            ok
        });
        prop_assert!(all_dirs);
    }

    /// Normalizing twice changes nothing, and no separator survives at the edges
    #[test]
    fn normalize_is_idempotent(raw in "[a-z./]{0,24}") {
        let once = normalize_path(&raw);
        prop_assert_eq!(normalize_path(&once), once.clone());
        prop_assert!(!once.starts_with('/'));
        prop_assert!(!once.ends_with('/'));
    }

    /// The hex prefix of a frame decodes to the frame's total length
    #[test]
    fn pkt_line_prefix_is_total_length(payload in proptest::collection::vec(any::<u8>(), 0..512)) {
        let frame = pktline::encode(&payload).unwrap();
        let len = usize::from_str_radix(std::str::from_utf8(&frame[..4]).unwrap(), 16).unwrap();
        prop_assert_eq!(len, frame.len());
        prop_assert_eq!(len, payload.len() + 4);

        let mut reader = PktLineReader::new(&frame);
        prop_assert_eq!(reader.next().unwrap().unwrap(), PktLine::Data(&payload));
        prop_assert!(reader.next().is_none());
    }

    /// Payloads past the protocol maximum are refused
    #[test]
    fn oversized_pkt_line_refused(extra in 1usize..64) {
        prop_assert!(pktline::encode(&vec![b'x'; MAX_PAYLOAD_LEN + extra]).is_err());
    }
}
