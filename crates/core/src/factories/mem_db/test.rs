use super::*;
use seqgate_api::db::DbErrorKind;
use seqgate_api::protocol::Severity;
use std::sync::atomic::{AtomicU64, Ordering};

fn collecting_callbacks(
    records: Arc<Mutex<Vec<DbRecord>>>,
    errors: Arc<Mutex<Vec<DbError>>>,
    readies: Arc<AtomicU64>,
) -> QueryCallbacks {
    QueryCallbacks {
        on_record: Box::new(move |r| records.lock().unwrap().push(r)),
        on_error: Box::new(move |e| errors.lock().unwrap().push(e)),
        on_ready: Box::new(move || {
            readies.fetch_add(1, Ordering::SeqCst);
        }),
    }
}

#[test]
fn delivers_on_first_poll_and_only_once() {
    let db = MemDb::create();
    db.insert_secondary(
        "NC_000001",
        SecondaryIdRecord {
            accession: "NC_000001".into(),
            version: 11,
            seq_id_type: 10,
        },
    );

    let records = Arc::new(Mutex::new(Vec::new()));
    let errors = Arc::new(Mutex::new(Vec::new()));
    let readies = Arc::new(AtomicU64::new(0));
    let mut q = db.secondary_id_query("NC_000001", None);
    q.submit(collecting_callbacks(
        records.clone(),
        errors.clone(),
        readies.clone(),
    ))
    .unwrap();

    // nothing before the poll, a ready signal right away
    assert!(records.lock().unwrap().is_empty());
    assert_eq!(1, readies.load(Ordering::SeqCst));

    q.poll();
    assert_eq!(1, records.lock().unwrap().len());
    q.poll();
    q.poll();
    assert_eq!(1, records.lock().unwrap().len());
    assert!(errors.lock().unwrap().is_empty());
    assert_eq!(1, db.call_count(DbOp::SecondaryId));
}

#[test]
fn chunk_stream_ends_with_complete() {
    let db = MemDb::create();
    let blob_id = BlobId::new(4, 7);
    db.insert_blob_chunks(
        blob_id,
        vec![bytes::Bytes::from_static(b"ab"), bytes::Bytes::from_static(b"cd")],
    );

    let records = Arc::new(Mutex::new(Vec::new()));
    let errors = Arc::new(Mutex::new(Vec::new()));
    let readies = Arc::new(AtomicU64::new(0));
    let mut q = db.blob_chunks_query("main_data", blob_id, 2);
    q.submit(collecting_callbacks(
        records.clone(),
        errors.clone(),
        readies,
    ))
    .unwrap();
    q.poll();

    let records = records.lock().unwrap();
    assert_eq!(3, records.len());
    assert!(matches!(
        records[0],
        DbRecord::BlobChunk { chunk_no: 0, .. }
    ));
    assert!(matches!(
        records[1],
        DbRecord::BlobChunk { chunk_no: 1, .. }
    ));
    assert!(matches!(records[2], DbRecord::Complete));
}

#[test]
fn cancel_detaches_before_delivery() {
    let db = MemDb::create();
    db.insert_blob_props(BlobProps {
        blob_id: BlobId::new(4, 7),
        last_modified: 0,
        size: 1,
        n_chunks: 1,
        id2_info: None,
    });

    let records = Arc::new(Mutex::new(Vec::new()));
    let errors = Arc::new(Mutex::new(Vec::new()));
    let readies = Arc::new(AtomicU64::new(0));
    let mut q = db.blob_props_query("main_data", BlobId::new(4, 7));
    q.submit(collecting_callbacks(
        records.clone(),
        errors.clone(),
        readies,
    ))
    .unwrap();
    q.cancel();
    q.poll();

    assert!(records.lock().unwrap().is_empty());
    assert!(errors.lock().unwrap().is_empty());
    assert_eq!(1, db.cancel_count());
}

#[test]
fn scripted_errors_and_warnings() {
    let db = MemDb::create();
    db.insert_secondary(
        "X",
        SecondaryIdRecord {
            accession: "A".into(),
            version: 1,
            seq_id_type: 10,
        },
    );

    // a fatal error replaces the result
    db.set_op_error(
        DbOp::SecondaryId,
        DbError::new(DbErrorKind::Timeout, "query timed out"),
    );
    let records = Arc::new(Mutex::new(Vec::new()));
    let errors = Arc::new(Mutex::new(Vec::new()));
    let readies = Arc::new(AtomicU64::new(0));
    let mut q = db.secondary_id_query("X", None);
    q.submit(collecting_callbacks(
        records.clone(),
        errors.clone(),
        readies.clone(),
    ))
    .unwrap();
    q.poll();
    assert!(records.lock().unwrap().is_empty());
    assert_eq!(1, errors.lock().unwrap().len());

    // a warning precedes the result instead
    db.set_op_error(
        DbOp::SecondaryId,
        DbError {
            kind: DbErrorKind::Unknown,
            severity: Severity::Warning,
            message: "replica lagging".into(),
        },
    );
    let records = Arc::new(Mutex::new(Vec::new()));
    let errors = Arc::new(Mutex::new(Vec::new()));
    let mut q = db.secondary_id_query("X", None);
    q.submit(collecting_callbacks(
        records.clone(),
        errors.clone(),
        readies,
    ))
    .unwrap();
    q.poll();
    assert_eq!(1, records.lock().unwrap().len());
    assert_eq!(1, errors.lock().unwrap().len());
}

#[tokio::test(flavor = "multi_thread")]
async fn delayed_delivery_happens_without_polling() {
    let db = MemDb::create();
    db.set_delay(Duration::from_millis(5));
    db.insert_secondary(
        "NC_000001",
        SecondaryIdRecord {
            accession: "NC_000001".into(),
            version: 11,
            seq_id_type: 10,
        },
    );

    let records = Arc::new(Mutex::new(Vec::new()));
    let errors = Arc::new(Mutex::new(Vec::new()));
    let readies = Arc::new(AtomicU64::new(0));
    let mut q = db.secondary_id_query("NC_000001", None);
    q.submit(collecting_callbacks(
        records.clone(),
        errors.clone(),
        readies,
    ))
    .unwrap();

    assert!(records.lock().unwrap().is_empty());
    for _ in 0..100 {
        tokio::time::sleep(Duration::from_millis(2)).await;
        if !records.lock().unwrap().is_empty() {
            return;
        }
    }
    panic!("delayed delivery never arrived");
}
