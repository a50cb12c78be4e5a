use seqgate_api::db::{DbError, DbErrorKind};
use seqgate_api::protocol::Severity;
use seqgate_api::{
    AnnotationRequest, BioseqInfo, BlobByIdRequest, BlobBySeqIdRequest,
    BlobId, BlobProps, CacheUse, NamedAnnotRecord, OutputFormat, Request,
    ResolveRequest, SecondaryIdRecord, TseOption,
};
use seqgate_core::factories::{
    AtomicCounters, DbOp, MemCache, MemCacheFactory, MemDb, MemDbFactory,
    MemTransport,
};
use seqgate_core::gateway::config::{SatKeyspace, SatMapConfig};
use seqgate_core::{
    default_builder, Gateway, PipelineState, RequestPipeline,
};
use seqgate_api::counters::CounterEvent;
use std::sync::Arc;
use std::time::Duration;

fn enable_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init()
        .ok();
}

async fn make_gateway(
    cache: Arc<MemCache>,
    db: Arc<MemDb>,
) -> Arc<Gateway> {
    let mut builder = default_builder();
    builder.cache = MemCacheFactory::with_instance(cache);
    builder.db = MemDbFactory::with_instance(db);
    builder
        .config
        .set_module_config(
            "satMap".into(),
            &SatMapConfig {
                satellites: vec![
                    SatKeyspace {
                        sat: 4,
                        keyspace: "main_data".into(),
                    },
                    SatKeyspace {
                        sat: 5,
                        keyspace: "split_data".into(),
                    },
                ],
            },
        )
        .unwrap();
    Gateway::create(builder.build()).await.unwrap()
}

fn counters(gateway: &Gateway) -> &AtomicCounters {
    gateway
        .counters()
        .as_any()
        .downcast_ref::<AtomicCounters>()
        .expect("the default counter store")
}

/// Drive a pipeline whose reads deliver on poll.
fn drive(pipeline: &mut RequestPipeline) {
    pipeline.start();
    for _ in 0..64 {
        if pipeline.is_finished() {
            return;
        }
        pipeline.peek(true);
    }
    panic!("pipeline did not finish");
}

/// Drive a pipeline whose reads deliver from spawned tasks.
async fn drive_async(pipeline: &mut RequestPipeline) {
    pipeline.start();
    for _ in 0..500 {
        if pipeline.is_finished() {
            return;
        }
        pipeline.peek(true);
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    panic!("pipeline did not finish");
}

/// Every reply must self-terminate: the reply-level completion counts one
/// more than everything before it, i.e. exactly the whole chunk stream.
fn assert_accounting(text: &str) {
    let markers = text.matches("SG-Reply-Chunk: ").count() as u64;
    let tail = text
        .rsplit("item_id=0&item_type=reply&chunk_type=meta&n_chunks=")
        .next()
        .expect("reply completion present");
    let n_chunks: u64 = tail
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect::<String>()
        .parse()
        .expect("n_chunks parses");
    assert_eq!(markers, n_chunks, "completion count mismatch in:\n{text}");
}

fn record(accession: &str, version: i16, seq_id_type: i16) -> BioseqInfo {
    BioseqInfo {
        accession: accession.into(),
        version,
        seq_id_type,
        length: 248_956_422,
        tax_id: 9606,
        sat: 4,
        sat_key: 77,
        ..Default::default()
    }
}

fn props(blob_id: BlobId, n_chunks: i32, id2_info: Option<&str>) -> BlobProps {
    BlobProps {
        blob_id,
        last_modified: 1_700_000_000_000,
        size: 2048,
        n_chunks,
        id2_info: id2_info.map(Into::into),
    }
}

fn resolve_request(seq_id: &str, cache_use: CacheUse) -> Request {
    Request::Resolve(ResolveRequest {
        seq_id: seq_id.into(),
        seq_id_type: None,
        cache_use,
        output_format: OutputFormat::Json,
    })
}

fn blob_by_id_request(blob_id: &str, tse: TseOption) -> Request {
    Request::BlobById(BlobByIdRequest {
        blob_id: blob_id.into(),
        cache_use: CacheUse::CacheAndDb,
        tse,
        exclude_blobs: Vec::new(),
        send_blob_if_small: None,
    })
}

#[tokio::test(flavor = "multi_thread")]
async fn resolve_served_from_cache_without_touching_the_db() {
    enable_tracing();
    let cache = MemCache::create();
    let db = MemDb::create();
    cache.insert_bioseq(record("NC_000001", 11, 10));
    // a conflicting record behind the cache must never be consulted
    let mut shadow = record("NC_000001", 11, 10);
    shadow.length = 1;
    db.insert_bioseq(shadow);

    let gateway = make_gateway(cache, db.clone()).await;
    let tx = MemTransport::create();
    let mut pipeline = Gateway::new_pipeline(&gateway,
        resolve_request("NC_000001.11", CacheUse::CacheAndDb),
        tx.clone(),
    );
    drive(&mut pipeline);

    assert_eq!(PipelineState::Completed, pipeline.state());
    assert_eq!(200, pipeline.status());
    assert_eq!(0, db.total_calls());

    let text = tx.collected_text();
    assert!(text.contains("item_type=bioseq_info&chunk_type=data&fmt=json"));
    assert!(text.contains("248956422"));
    assert_accounting(&text);
    // resolve replies are delivered atomically
    assert_eq!(1, tx.send_count());
    assert!(tx.is_finalized());
    assert_eq!(1, counters(&gateway).get(CounterEvent::RequestResolve));
    assert_eq!(1, counters(&gateway).get(CounterEvent::CacheHit));
}

#[tokio::test(flavor = "multi_thread")]
async fn resolve_passthrough_returns_the_stored_payload() {
    let cache = MemCache::create();
    cache.insert_bioseq(record("NC_000001", 11, 10));
    let gateway = make_gateway(cache, MemDb::create()).await;
    let tx = MemTransport::create();
    let mut pipeline = Gateway::new_pipeline(&gateway,
        Request::Resolve(ResolveRequest {
            seq_id: "NC_000001.11".into(),
            seq_id_type: None,
            cache_use: CacheUse::CacheOnly,
            output_format: OutputFormat::Protobuf,
        }),
        tx.clone(),
    );
    drive(&mut pipeline);
    let text = tx.collected_text();
    assert!(text.contains("item_type=bioseq_info&chunk_type=data&fmt=protobuf"));
    assert_accounting(&text);
}

#[tokio::test(flavor = "multi_thread")]
async fn unresolved_identifier_is_not_found() {
    let gateway = make_gateway(MemCache::create(), MemDb::create()).await;
    let tx = MemTransport::create();
    let mut pipeline = Gateway::new_pipeline(&gateway,
        resolve_request("NC_999999", CacheUse::CacheOnly),
        tx.clone(),
    );
    drive(&mut pipeline);

    assert_eq!(404, pipeline.status());
    let text = tx.collected_text();
    assert!(text.contains("item_type=reply&chunk_type=message"));
    assert!(text.contains("status=404&code=200"));
    assert_accounting(&text);
    assert_eq!(1, counters(&gateway).get(CounterEvent::NotFound));
}

#[tokio::test(flavor = "multi_thread")]
async fn secondary_key_without_backing_record_is_an_inconsistency() {
    enable_tracing();
    let cache = MemCache::create();
    let db = MemDb::create();
    cache.insert_secondary(
        "NC_000001",
        SecondaryIdRecord {
            accession: "NC_000001".into(),
            version: 11,
            seq_id_type: 5,
        },
    );
    let gateway = make_gateway(cache.clone(), db.clone()).await;
    let tx = MemTransport::create();
    let mut pipeline = Gateway::new_pipeline(&gateway,
        resolve_request("NC_000001", CacheUse::CacheOnly),
        tx.clone(),
    );
    drive(&mut pipeline);

    assert_eq!(500, pipeline.status());
    let text = tx.collected_text();
    assert!(text.contains("status=500&code=301"));
    assert_accounting(&text);

    // one secondary-id lookup, one full-record promotion attempt, no db
    let lookups = cache.lookup_counts();
    assert_eq!(1, lookups.secondary);
    assert_eq!(1, lookups.bioseq);
    assert_eq!(0, db.total_calls());
    assert_eq!(
        1,
        counters(&gateway).get(CounterEvent::DataInconsistency),
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn resolution_falls_through_to_the_db_exactly_once() {
    enable_tracing();
    let db = MemDb::create();
    db.set_delay(Duration::from_millis(3));
    db.insert_secondary(
        "NC_000001.11",
        SecondaryIdRecord {
            accession: "NC_000001".into(),
            version: 11,
            seq_id_type: 10,
        },
    );
    db.insert_bioseq(record("NC_000001", 11, 10));

    let gateway = make_gateway(MemCache::create(), db.clone()).await;
    let tx = MemTransport::create();
    let mut pipeline = Gateway::new_pipeline(&gateway,
        resolve_request("NC_000001.11", CacheUse::CacheAndDb),
        tx.clone(),
    );
    drive_async(&mut pipeline).await;

    assert_eq!(200, pipeline.status());
    let text = tx.collected_text();
    // exactly one resolution produced exactly one bioseq item
    assert_eq!(
        1,
        text.matches("item_type=bioseq_info&chunk_type=data").count(),
    );
    assert_accounting(&text);
    assert_eq!(1, db.call_count(DbOp::SecondaryId));
    assert_eq!(1, db.call_count(DbOp::BioseqInfo));
}

#[tokio::test(flavor = "multi_thread")]
async fn blob_by_id_streams_props_then_chunks_in_order() {
    let cache = MemCache::create();
    let db = MemDb::create();
    let blob_id = BlobId::new(4, 77);
    cache.insert_blob_props(props(blob_id, 2, None));
    db.insert_blob_chunks(
        blob_id,
        vec![
            bytes::Bytes::from_static(b"GATTACA0"),
            bytes::Bytes::from_static(b"GATTACA1"),
        ],
    );

    let gateway = make_gateway(cache, db).await;
    let tx = MemTransport::create();
    let mut pipeline = Gateway::new_pipeline(
        &gateway,
        blob_by_id_request("4.77", TseOption::Smart), tx.clone());
    drive(&mut pipeline);

    assert_eq!(200, pipeline.status());
    let text = tx.collected_text();
    let prop_at = text
        .find("item_type=blob_prop&chunk_type=data&blob_id=4.77")
        .expect("props reported");
    let chunk0_at = text
        .find("blob_id=4.77&blob_chunk=0")
        .expect("chunk 0 delivered");
    let chunk1_at = text
        .find("blob_id=4.77&blob_chunk=1")
        .expect("chunk 1 delivered");
    assert!(prop_at < chunk0_at && chunk0_at < chunk1_at);
    assert!(text.contains("GATTACA0"));
    assert!(text.contains("GATTACA1"));
    assert_accounting(&text);
    // no identifier was involved, so no bioseq item
    assert!(!text.contains("item_type=bioseq_info"));
}

#[tokio::test(flavor = "multi_thread")]
async fn blob_by_seq_id_resolves_then_fetches() {
    let cache = MemCache::create();
    let db = MemDb::create();
    cache.insert_bioseq(record("NC_000001", 11, 10));
    cache.insert_blob_props(props(BlobId::new(4, 77), 1, None));
    db.insert_blob_chunks(
        BlobId::new(4, 77),
        vec![bytes::Bytes::from_static(b"SEQDATA")],
    );

    let gateway = make_gateway(cache, db).await;
    let tx = MemTransport::create();
    let mut pipeline = Gateway::new_pipeline(&gateway,
        Request::BlobBySeqId(BlobBySeqIdRequest {
            seq_id: "NC_000001.11".into(),
            seq_id_type: None,
            cache_use: CacheUse::CacheAndDb,
            tse: TseOption::Smart,
            exclude_blobs: Vec::new(),
            send_blob_if_small: None,
        }),
        tx.clone(),
    );
    drive(&mut pipeline);

    assert_eq!(200, pipeline.status());
    let text = tx.collected_text();
    assert!(text.contains("SEQDATA"));
    assert!(text.contains("blob_id=4.77"));
    assert_accounting(&text);
}

#[tokio::test(flavor = "multi_thread")]
async fn whole_split_object_is_reassembled_from_companions() {
    enable_tracing();
    let cache = MemCache::create();
    let db = MemDb::create();
    let top = BlobId::new(4, 1000);
    cache.insert_blob_props(props(top, 2, Some("5.1001.3")));
    // info blob 5.1001, chunk blobs at 998..1000
    let companions = [
        (BlobId::new(5, 1001), &b"SPLITINFO"[..]),
        (BlobId::new(5, 998), &b"PART1"[..]),
        (BlobId::new(5, 999), &b"PART2"[..]),
        (BlobId::new(5, 1000), &b"PART3"[..]),
    ];
    for (blob_id, payload) in companions {
        db.insert_blob_props(props(blob_id, 1, None));
        db.insert_blob_chunks(
            blob_id,
            vec![bytes::Bytes::copy_from_slice(payload)],
        );
    }

    let gateway = make_gateway(cache, db.clone()).await;
    let tx = MemTransport::create();
    let mut pipeline = Gateway::new_pipeline(&gateway,
        blob_by_id_request("4.1000", TseOption::Whole),
        tx.clone(),
    );
    drive(&mut pipeline);

    assert_eq!(200, pipeline.status());
    let text = tx.collected_text();
    for payload in ["SPLITINFO", "PART1", "PART2", "PART3"] {
        assert!(text.contains(payload), "missing {payload}");
    }
    // the top props plus one per companion
    assert_eq!(
        5,
        text.matches("item_type=blob_prop&chunk_type=data").count(),
    );
    assert_accounting(&text);
    assert_eq!(4, db.call_count(DbOp::BlobProps));
    assert_eq!(4, db.call_count(DbOp::BlobChunks));
}

#[tokio::test(flavor = "multi_thread")]
async fn cache_only_miss_is_404_for_client_and_500_for_derived_locators() {
    // client-supplied locator
    let gateway =
        make_gateway(MemCache::create(), MemDb::create()).await;
    let tx = MemTransport::create();
    let mut pipeline = Gateway::new_pipeline(&gateway,
        Request::BlobById(BlobByIdRequest {
            blob_id: "4.99".into(),
            cache_use: CacheUse::CacheOnly,
            tse: TseOption::Smart,
            exclude_blobs: Vec::new(),
            send_blob_if_small: None,
        }),
        tx.clone(),
    );
    drive(&mut pipeline);
    assert_eq!(404, pipeline.status());
    assert!(tx.collected_text().contains("status=404&code=201"));

    // the same miss behind a resolution is the server's fault
    let cache = MemCache::create();
    cache.insert_bioseq(record("NC_000001", 11, 10));
    let gateway = make_gateway(cache, MemDb::create()).await;
    let tx = MemTransport::create();
    let mut pipeline = Gateway::new_pipeline(&gateway,
        Request::BlobBySeqId(BlobBySeqIdRequest {
            seq_id: "NC_000001.11".into(),
            seq_id_type: None,
            cache_use: CacheUse::CacheOnly,
            tse: TseOption::Smart,
            exclude_blobs: Vec::new(),
            send_blob_if_small: None,
        }),
        tx.clone(),
    );
    drive(&mut pipeline);
    assert_eq!(500, pipeline.status());
    let text = tx.collected_text();
    assert!(text.contains("status=500&code=201"));
    assert_accounting(&text);
    assert_eq!(
        1,
        counters(&gateway).get(CounterEvent::DataInconsistency),
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn cancellation_drains_every_outstanding_fetch() {
    enable_tracing();
    let cache = MemCache::create();
    let db = MemDb::create();
    db.set_delay(Duration::from_millis(50));
    let top = BlobId::new(4, 1000);
    // four numbered chunks plus the info blob: five outstanding reads
    cache.insert_blob_props(props(top, 2, Some("5.1005.4")));

    let gateway = make_gateway(cache, db.clone()).await;
    let tx = MemTransport::create();
    let mut pipeline = Gateway::new_pipeline(&gateway,
        blob_by_id_request("4.1000", TseOption::Whole),
        tx.clone(),
    );
    pipeline.start();
    assert!(!pipeline.is_finished());

    pipeline.cancel();
    assert_eq!(PipelineState::Cancelled, pipeline.state());
    assert_eq!(5, db.cancel_count());
    assert_eq!(1, counters(&gateway).get(CounterEvent::Cancelled));

    let text = tx.collected_text();
    // exactly one forced completion, no companion data
    assert_eq!(
        1,
        text.matches("item_type=reply&chunk_type=meta").count(),
    );
    assert!(!text.contains("chunk_type=data&blob_id=5."));
    assert_accounting(&text);

    // the delayed deliveries find their callbacks detached
    tokio::time::sleep(Duration::from_millis(80)).await;
    assert_eq!(text, tx.collected_text());
}

#[tokio::test(flavor = "multi_thread")]
async fn companion_failure_leaves_siblings_intact() {
    enable_tracing();
    let cache = MemCache::create();
    let db = MemDb::create();
    let top = BlobId::new(4, 1000);
    cache.insert_blob_props(props(top, 2, Some("5.1001.2")));
    // info blob and chunk 2 deliver; chunk 1 (5.998) times out
    for blob_id in [BlobId::new(5, 1001), BlobId::new(5, 999)] {
        db.insert_blob_props(props(blob_id, 1, None));
        db.insert_blob_chunks(
            blob_id,
            vec![bytes::Bytes::from_static(b"COMPANION")],
        );
    }
    db.set_blob_error(
        BlobId::new(5, 998),
        DbError::new(DbErrorKind::Timeout, "query timed out"),
    );

    let gateway = make_gateway(cache, db).await;
    let tx = MemTransport::create();
    let mut pipeline = Gateway::new_pipeline(&gateway,
        blob_by_id_request("4.1000", TseOption::Whole),
        tx.clone(),
    );
    drive(&mut pipeline);

    assert_eq!(PipelineState::Completed, pipeline.state());
    assert_eq!(500, pipeline.status());
    let text = tx.collected_text();
    assert_eq!(2, text.matches("COMPANION").count());
    assert!(text.contains("status=500&code=400"));
    assert_accounting(&text);
    assert_eq!(1, counters(&gateway).get(CounterEvent::DbTimeout));
}

#[tokio::test(flavor = "multi_thread")]
async fn excluded_blob_is_skipped_not_fetched() {
    let cache = MemCache::create();
    cache.insert_blob_props(props(BlobId::new(4, 77), 1, None));
    let db = MemDb::create();
    let gateway = make_gateway(cache.clone(), db.clone()).await;
    let tx = MemTransport::create();
    let mut pipeline = Gateway::new_pipeline(&gateway,
        Request::BlobById(BlobByIdRequest {
            blob_id: "4.77".into(),
            cache_use: CacheUse::CacheAndDb,
            tse: TseOption::Whole,
            exclude_blobs: vec![BlobId::new(4, 77)],
            send_blob_if_small: None,
        }),
        tx.clone(),
    );
    drive(&mut pipeline);

    assert_eq!(200, pipeline.status());
    let text = tx.collected_text();
    assert!(text.contains("severity=info"));
    assert!(text.contains("code=202"));
    assert!(!text.contains("chunk_type=data&blob_id=4.77"));
    assert_accounting(&text);
    assert_eq!(0, db.total_calls());
    assert_eq!(0, cache.lookup_counts().blob_props);
}

#[tokio::test(flavor = "multi_thread")]
async fn size_gate_withholds_large_blob_data() {
    let cache = MemCache::create();
    cache.insert_blob_props(props(BlobId::new(4, 77), 2, None));
    let db = MemDb::create();
    let gateway = make_gateway(cache, db.clone()).await;
    let tx = MemTransport::create();
    let mut pipeline = Gateway::new_pipeline(&gateway,
        Request::BlobById(BlobByIdRequest {
            blob_id: "4.77".into(),
            cache_use: CacheUse::CacheAndDb,
            tse: TseOption::Whole,
            exclude_blobs: Vec::new(),
            send_blob_if_small: Some(100),
        }),
        tx.clone(),
    );
    drive(&mut pipeline);

    let text = tx.collected_text();
    assert!(text.contains("item_type=blob_prop&chunk_type=data"));
    assert!(!text.contains("item_type=blob&chunk_type=data"));
    assert_accounting(&text);
    assert_eq!(0, db.call_count(DbOp::BlobChunks));
}

#[tokio::test(flavor = "multi_thread")]
async fn malformed_blob_id_is_a_bad_request() {
    let gateway = make_gateway(MemCache::create(), MemDb::create()).await;
    let tx = MemTransport::create();
    let mut pipeline = Gateway::new_pipeline(
        &gateway,
        blob_by_id_request("4.x", TseOption::Smart), tx.clone());
    drive(&mut pipeline);

    assert_eq!(400, pipeline.status());
    let text = tx.collected_text();
    assert!(text.contains("status=400&code=100"));
    assert_accounting(&text);
    assert_eq!(
        1,
        counters(&gateway).get(CounterEvent::MalformedRequest),
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn annotations_are_filtered_and_delivered_atomically() {
    let cache = MemCache::create();
    let db = MemDb::create();
    cache.insert_bioseq(record("NC_000001", 11, 10));
    db.insert_annot(
        "NC_000001",
        NamedAnnotRecord {
            annot_name: "SNP".into(),
            sat: 5,
            sat_key: 12,
            last_modified: 0,
            start: 100,
            stop: 5000,
        },
    );
    db.insert_annot(
        "NC_000001",
        NamedAnnotRecord {
            annot_name: "CDD".into(),
            sat: 5,
            sat_key: 13,
            last_modified: 0,
            start: 1,
            stop: 99,
        },
    );

    let gateway = make_gateway(cache, db).await;
    let tx = MemTransport::create();
    let mut pipeline = Gateway::new_pipeline(&gateway,
        Request::Annotation(AnnotationRequest {
            seq_id: "NC_000001.11".into(),
            seq_id_type: None,
            cache_use: CacheUse::CacheAndDb,
            names: vec!["SNP".into()],
        }),
        tx.clone(),
    );
    drive(&mut pipeline);

    assert_eq!(200, pipeline.status());
    let text = tx.collected_text();
    assert_eq!(1, text.matches("item_type=na&chunk_type=data").count());
    assert!(text.contains("SNP"));
    assert!(!text.contains("CDD"));
    assert_accounting(&text);
    // annotation replies are delivered atomically
    assert_eq!(1, tx.send_count());
}

#[tokio::test(flavor = "multi_thread")]
async fn backpressure_defers_flushing_until_writable() {
    let cache = MemCache::create();
    let db = MemDb::create();
    cache.insert_blob_props(props(BlobId::new(4, 77), 1, None));
    db.insert_blob_chunks(
        BlobId::new(4, 77),
        vec![bytes::Bytes::from_static(b"SEQDATA")],
    );

    let gateway = make_gateway(cache, db).await;
    let tx = MemTransport::create();
    tx.set_output_blocked(true);
    let woken = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let woken_in_cb = woken.clone();
    tx.register_for_wake(Arc::new(move || {
        woken_in_cb.store(true, std::sync::atomic::Ordering::SeqCst);
    }));

    let mut pipeline = Gateway::new_pipeline(
        &gateway,
        blob_by_id_request("4.77", TseOption::Smart), tx.clone());
    pipeline.start();
    for _ in 0..8 {
        pipeline.peek(true);
    }
    assert!(!pipeline.is_finished());
    assert_eq!(0, tx.send_count());

    tx.set_output_blocked(false);
    assert!(woken.load(std::sync::atomic::Ordering::SeqCst));
    pipeline.peek(true);
    assert!(pipeline.is_finished());
    let text = tx.collected_text();
    assert!(text.contains("SEQDATA"));
    assert_accounting(&text);
}

#[tokio::test(flavor = "multi_thread")]
async fn sub_error_severities_do_not_fail_the_request() {
    let cache = MemCache::create();
    let db = MemDb::create();
    cache.insert_bioseq(record("NC_000001", 11, 10));
    db.insert_annot(
        "NC_000001",
        NamedAnnotRecord {
            annot_name: "SNP".into(),
            sat: 5,
            sat_key: 12,
            last_modified: 0,
            start: 100,
            stop: 5000,
        },
    );
    db.set_op_error(
        DbOp::NamedAnnot,
        DbError {
            kind: DbErrorKind::Unknown,
            severity: Severity::Warning,
            message: "replica lagging".into(),
        },
    );

    let gateway = make_gateway(cache, db).await;
    let tx = MemTransport::create();
    let mut pipeline = Gateway::new_pipeline(&gateway,
        Request::Annotation(AnnotationRequest {
            seq_id: "NC_000001.11".into(),
            seq_id_type: None,
            cache_use: CacheUse::CacheAndDb,
            names: Vec::new(),
        }),
        tx.clone(),
    );
    drive(&mut pipeline);

    assert_eq!(200, pipeline.status());
    let text = tx.collected_text();
    assert!(text.contains("item_type=na&chunk_type=data"));
    assert!(!text.contains("chunk_type=message"));
    assert_accounting(&text);
}

#[tokio::test(flavor = "multi_thread")]
async fn client_disconnect_cancels_the_request() {
    let cache = MemCache::create();
    let db = MemDb::create();
    db.set_delay(Duration::from_millis(50));
    cache.insert_blob_props(props(BlobId::new(4, 77), 1, None));

    let gateway = make_gateway(cache, db.clone()).await;
    let tx = MemTransport::create();
    let mut pipeline = Gateway::new_pipeline(
        &gateway,
        blob_by_id_request("4.77", TseOption::Smart), tx.clone());
    pipeline.start();
    assert!(!pipeline.is_finished());

    tx.close();
    pipeline.peek(true);

    assert_eq!(PipelineState::Cancelled, pipeline.state());
    assert_eq!(1, db.cancel_count());
    assert_eq!(1, counters(&gateway).get(CounterEvent::Cancelled));
}
