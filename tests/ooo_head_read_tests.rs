use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use ugnos_ooo::disk::{DiskChunkRef, ResolvedChunk};
use ugnos_ooo::pool::ChunkPool;
use ugnos_ooo::*;

// Helper: head with series 1 {foo="bar"} holding the given mmapped OOO chunks, in creation order.
fn head_with_chunks(mapper: Arc<dyn ChunkDiskMapper>, intervals: &[(Timestamp, Timestamp)]) -> Arc<Head> {
    let head = Head::new(HeadConfig::default(), mapper).unwrap();
    head.get_or_create(Labels::from_pairs(&[("foo", "bar")]))
        .unwrap();
    for (min, max) in intervals {
        head.add_mmapped_ooo_chunk(1, *min, *max, payload(*min, *max).as_bytes())
            .unwrap();
    }
    Arc::new(head)
}

fn payload(min: Timestamp, max: Timestamp) -> String {
    format!("{}-{}", min, max)
}

fn chunk_ref(id: u64) -> ChunkRef {
    ChunkRef::pack(1, id).unwrap()
}

fn assert_well_formed(chks: &[ChunkMeta]) {
    for pair in chks.windows(2) {
        assert!(pair[1].min_time > pair[0].max_time, "overlap in {:?}", chks);
    }
    if let Some(first) = chks.first() {
        for c in chks {
            assert_eq!(
                (c.ooo_last_ref, c.ooo_last_min_time, c.ooo_last_max_time),
                (first.ooo_last_ref, first.ooo_last_min_time, first.ooo_last_max_time)
            );
        }
    }
}

#[test]
fn empty_series_returns_no_chunks() {
    let head = head_with_chunks(Arc::new(MemChunkMapper::new()), &[]);
    let chks = head.ooo_index_reader(0, 100).series_chunks(1).unwrap();
    assert!(chks.is_empty());
}

#[test]
fn query_after_only_chunk_returns_no_chunks() {
    let head = head_with_chunks(Arc::new(MemChunkMapper::new()), &[(100, 400)]);
    let chks = head.ooo_index_reader(500, 700).series_chunks(1).unwrap();
    assert!(chks.is_empty());
}

#[test]
fn overlapping_chunks_collapse_to_run_starts_with_newest_anchor() {
    let head = head_with_chunks(
        Arc::new(MemChunkMapper::new()),
        &[(100, 200), (500, 600), (150, 250), (550, 650)],
    );
    let chks = head.ooo_index_reader(0, 700).series_chunks(1).unwrap();

    assert_eq!(chks.len(), 2);
    assert_eq!(chks[0].chunk_ref, chunk_ref(0));
    assert_eq!(chks[0].min_time, 100);
    assert_eq!(chks[1].chunk_ref, chunk_ref(1));
    assert_eq!(chks[1].min_time, 500);
    for c in &chks {
        assert_eq!(c.ooo_last_ref, chunk_ref(3));
        assert_eq!((c.ooo_last_min_time, c.ooo_last_max_time), (550, 650));
    }
    // Runs are widened to cover every chunk they absorbed.
    assert_eq!(chks[0].max_time, 250);
    assert_eq!(chks[1].max_time, 650);
}

#[test]
fn chunks_touching_at_boundaries_merge() {
    let head = head_with_chunks(
        Arc::new(MemChunkMapper::new()),
        &[(100, 200), (200, 300), (300, 400), (400, 500)],
    );
    let chks = head.ooo_index_reader(0, 700).series_chunks(1).unwrap();
    assert_eq!(chks.len(), 1);
    assert_eq!((chks[0].min_time, chks[0].max_time), (100, 500));
    assert_eq!(chks[0].chunk_ref, chunk_ref(0));
    assert_eq!(chks[0].ooo_last_ref, chunk_ref(3));
}

#[test]
fn series_removed_between_index_and_chunk_resolution_is_not_found() {
    let head = head_with_chunks(Arc::new(MemChunkMapper::new()), &[(100, 200)]);
    let chks = head.ooo_index_reader(0, 1000).series_chunks(1).unwrap();
    assert_eq!(head.gc_series(|_| true).unwrap(), 1);

    let err = head
        .ooo_chunk_reader(0, 1000)
        .chunk(chks[0].chunk_ref)
        .unwrap_err();
    assert!(err.is_not_found(), "{:?}", err);
}

#[test]
fn ref_of_collected_series_never_reaches_a_new_series() {
    let head = Arc::new(Head::new(HeadConfig::default(), Arc::new(MemChunkMapper::new())).unwrap());
    let (old, _) = head
        .get_or_create(Labels::from_pairs(&[("job", "old")]))
        .unwrap();
    head.add_mmapped_ooo_chunk(old.series_ref(), 100, 200, b"old-series")
        .unwrap();
    let old_ref = head.ooo_index_reader(0, 1000).series_chunks(old.series_ref()).unwrap()[0].chunk_ref;

    assert!(head.remove_series(old.series_ref()).unwrap());
    let (new, created) = head
        .get_or_create(Labels::from_pairs(&[("job", "new")]))
        .unwrap();
    assert!(created);
    assert_ne!(new.series_ref(), old.series_ref());
    head.add_mmapped_ooo_chunk(new.series_ref(), 100, 200, b"new-series")
        .unwrap();

    let cr = head.ooo_chunk_reader(0, 1000);
    assert!(cr.chunk(old_ref).unwrap_err().is_not_found());
    let new_ref = ChunkRef::pack(new.series_ref(), 0).unwrap();
    assert_eq!(cr.chunk(new_ref).unwrap().bytes(), b"new-series");
}

#[test]
fn repeated_queries_are_identical() {
    let head = head_with_chunks(
        Arc::new(MemChunkMapper::new()),
        &[(10, 20), (5, 12), (40, 60), (55, 70), (100, 110)],
    );
    head.append_ooo(1, 30, 45, b"h").unwrap();
    let ir = head.ooo_index_reader(0, 1000);

    let first = ir.series_chunks(1).unwrap();
    assert_well_formed(&first);
    for _ in 0..10 {
        assert_eq!(ir.series_chunks(1).unwrap(), first);
    }
}

#[test]
fn descriptors_still_resolve_after_truncation_or_not_found() {
    let head = head_with_chunks(
        Arc::new(MemChunkMapper::new()),
        &[(100, 200), (300, 400), (500, 600)],
    );
    let chks = head.ooo_index_reader(0, 1000).series_chunks(1).unwrap();
    assert_eq!(chks.len(), 3);

    assert_eq!(head.truncate_ooo(250).unwrap(), 1);

    let cr = head.ooo_chunk_reader(0, 1000);
    assert!(cr.chunk(chks[0].chunk_ref).unwrap_err().is_not_found());
    for c in &chks[1..] {
        let chunk = cr.chunk(c.chunk_ref).unwrap();
        assert_eq!(chunk.bytes(), payload(c.min_time, c.max_time).as_bytes());
    }
}

#[test]
fn mmapping_the_open_chunk_keeps_refs_valid() {
    let head = head_with_chunks(Arc::new(MemChunkMapper::new()), &[(100, 200)]);
    head.append_ooo(1, 250, 260, b"open").unwrap();

    let chks = head.ooo_index_reader(0, 1000).series_chunks(1).unwrap();
    let open_ref = chks[1].chunk_ref;
    assert_eq!(chks[0].ooo_last_ref, open_ref);

    head.mmap_ooo_head_chunk(1).unwrap();
    let chunk = head.ooo_chunk_reader(0, 1000).chunk(open_ref).unwrap();
    assert_eq!(chunk.bytes(), b"open");
    assert_eq!((chunk.min_time(), chunk.max_time()), (250, 260));
}

#[test]
fn open_chunk_blocks_closed_chunk_until_mmapped() {
    let head = head_with_chunks(Arc::new(MemChunkMapper::new()), &[]);
    head.append_ooo(1, 10, 20, b"open").unwrap();
    assert!(matches!(
        head.add_mmapped_ooo_chunk(1, 30, 40, b"x"),
        Err(DbError::OpenHeadChunk(1))
    ));
    assert_eq!(head.mmap_ooo_head_chunk(1).unwrap(), Some(0));
    assert_eq!(head.add_mmapped_ooo_chunk(1, 30, 40, b"x").unwrap(), 1);
}

#[derive(Debug)]
struct FailingMapper {
    inner: MemChunkMapper,
    fail: AtomicBool,
}

impl ChunkDiskMapper for FailingMapper {
    fn write_chunk(
        &self,
        series: SeriesRef,
        min_time: Timestamp,
        max_time: Timestamp,
        bytes: &[u8],
    ) -> Result<DiskChunkRef, DbError> {
        self.inner.write_chunk(series, min_time, max_time, bytes)
    }

    fn chunk(&self, disk_ref: DiskChunkRef, pool: &ChunkPool) -> Result<ResolvedChunk, DbError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(DbError::ChunkMapper("corrupted segment".to_string()));
        }
        self.inner.chunk(disk_ref, pool)
    }
}

#[derive(Debug, Default)]
struct Recorder(Mutex<Vec<DbEvent>>);

impl DbEventListener for Recorder {
    fn on_event(&self, event: DbEvent) {
        self.0.lock().unwrap().push(event);
    }
}

#[test]
fn mapper_failure_propagates_and_releases_the_series_lock() {
    let mapper = Arc::new(FailingMapper {
        inner: MemChunkMapper::new(),
        fail: AtomicBool::new(true),
    });
    let rec = Arc::new(Recorder::default());
    let cfg = HeadConfig {
        event_listener: rec.clone(),
        ..HeadConfig::default()
    };
    let head = Arc::new(Head::new(cfg, mapper.clone()).unwrap());
    head.get_or_create(Labels::from_pairs(&[("foo", "bar")]))
        .unwrap();
    head.add_mmapped_ooo_chunk(1, 100, 200, b"x").unwrap();

    let cr = head.ooo_chunk_reader(0, 1000);
    let err = cr.chunk(chunk_ref(0)).unwrap_err();
    assert!(matches!(err, DbError::ChunkMapper(_)));
    assert_eq!(head.stats().chunk_resolve_failures(), 1);
    assert_eq!(
        rec.0.lock().unwrap().as_slice(),
        &[DbEvent::OooChunkResolveFailed {
            series: 1,
            chunk_id: 0,
            error: "Chunk mapper error: corrupted segment".to_string(),
        }]
    );

    // The lock was released: both readers still work on the same series.
    assert_eq!(head.ooo_index_reader(0, 1000).series_chunks(1).unwrap().len(), 1);
    mapper.fail.store(false, Ordering::SeqCst);
    assert_eq!(cr.chunk(chunk_ref(0)).unwrap().bytes(), b"x");
}

#[test]
fn concurrent_readers_and_head_maintenance() {
    let head = Arc::new(
        Head::new(
            HeadConfig {
                chunk_pool_capacity: 4,
                ..HeadConfig::default()
            },
            Arc::new(MemChunkMapper::with_copy_on_read()),
        )
        .unwrap(),
    );
    head.get_or_create(Labels::from_pairs(&[("foo", "bar")]))
        .unwrap();

    let stop = Arc::new(AtomicBool::new(false));

    let writer = {
        let head = Arc::clone(&head);
        let stop = Arc::clone(&stop);
        thread::spawn(move || {
            let mut t: Timestamp = 0;
            let mut round = 0u64;
            while !stop.load(Ordering::Relaxed) {
                // Out-of-order: every chunk starts a little before the previous one ended.
                if round % 3 == 0 {
                    head.mmap_ooo_head_chunk(1).unwrap();
                    let (min, max) = (t, t + 15);
                    head.add_mmapped_ooo_chunk(1, min, max, payload(min, max).as_bytes())
                        .unwrap();
                }
                head.append_ooo(1, t + 5, t + 8, b"hh").unwrap();
                if round % 7 == 0 {
                    head.truncate_ooo(t - 60).unwrap();
                }
                t += 10;
                round += 1;
                if round == 2_000 {
                    break;
                }
            }
        })
    };

    let mut readers = vec![];
    for _ in 0..4 {
        let head = Arc::clone(&head);
        readers.push(thread::spawn(move || {
            let ir = head.ooo_index_reader(Timestamp::MIN, Timestamp::MAX);
            let cr = head.ooo_chunk_reader(Timestamp::MIN, Timestamp::MAX);
            let mut resolved = 0usize;
            for _ in 0..300 {
                let chks = ir.series_chunks(1).unwrap();
                assert_well_formed(&chks);
                for c in &chks {
                    match cr.chunk(c.chunk_ref) {
                        Ok(chunk) => {
                            let bytes = chunk.bytes();
                            let expected = payload(chunk.min_time(), chunk.max_time());
                            // Either an mmapped payload or an (open or mmapped) head chunk
                            // made only of appended samples; never someone else's bytes.
                            assert!(
                                bytes == expected.as_bytes()
                                    || (!bytes.is_empty() && bytes.iter().all(|b| *b == b'h')),
                                "unexpected bytes {:?} for [{}, {}]",
                                String::from_utf8_lossy(bytes),
                                chunk.min_time(),
                                chunk.max_time()
                            );
                            resolved += 1;
                        }
                        Err(e) => assert!(e.is_not_found(), "{:?}", e),
                    }
                }
            }
            resolved
        }));
    }

    let mut total = 0;
    for r in readers {
        total += r.join().unwrap();
    }
    stop.store(true, Ordering::Relaxed);
    writer.join().unwrap();

    assert!(total > 0);
    assert!(head.chunk_pool().idle() <= 4);
}
