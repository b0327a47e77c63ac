use folio::cache::{CacheConfig, CacheController, Fingerprint, ListState};
use folio::domain::error::FetchError;
use folio::domain::query::{Query, SortDirection};
use folio::domain::{PageResponse, Record, RecordId, RecordKind};
use folio::infra::event_log::{parse_event_log, read_event_log, write_event_log};

const LOG: &str = r#"
# two pages of a text search, then a failing continuation
{"type":"result_load_started","fingerprint":"search?q=ports","request":{"offset":0,"limit":2}}
{"type":"result_load_completed","fingerprint":"search?q=ports","page":{"offset":0,"limit":2,"next":"tok1","results":[{"id":"a","kind":"entity","name":"Ada"},{"id":"b","kind":"entity"}]}}
{"type":"result_load_started","fingerprint":"search?q=ports","request":{"offset":2,"limit":2,"next":"tok1"}}
{"type":"result_load_failed","fingerprint":"search?q=ports","error":{"message":"busy","status":503}}
"#;

fn drive(controller: &mut CacheController) {
    let query = Query::new("search").text("ports").limit(2);
    let ticket = controller.begin_load(&query).expect("load");
    controller
        .complete_page(
            &ticket,
            PageResponse::new(
                0,
                2,
                vec![
                    Record::new("a", RecordKind::Entity).with_field("name", "Ada"),
                    Record::new("b", RecordKind::Entity),
                ],
                Some("tok1".to_string()),
            ),
        )
        .expect("merge");

    let next = controller
        .begin_next_page(&query.fingerprint())
        .expect("next");
    controller
        .fail_page(&next, FetchError::http(503, "busy"))
        .expect("fail");
    controller
        .retry_next_page(&query.fingerprint())
        .expect("retry");
    controller
        .delete_object(&RecordId::from("b"))
        .expect("delete");

    let stale = controller
        .begin_load(&Query::new("collections").limit(2))
        .expect("second window");
    controller.invalidate_all();
    let _ = controller.complete_page(
        &stale,
        PageResponse::new(0, 2, vec![Record::new("c", RecordKind::Collection)], None),
    );
}

#[test]
fn fingerprints_are_canonical() {
    let query = Query::new("search")
        .sort_by("rank", SortDirection::Desc)
        .filter("schema", "Person")
        .text("ports");
    insta::assert_snapshot!(
        query.fingerprint().as_str(),
        @"search?q=ports&filter%3Aschema=Person&sort=rank%3Adesc"
    );

    let reordered = Query::from_search(
        "search",
        "sort=rank:desc&filter:schema=Person&q=ports&limit=50",
        &[],
        None,
    );
    assert_eq!(reordered.fingerprint(), query.fingerprint());
}

#[test]
fn hand_written_log_replays_into_a_view() {
    let events = parse_event_log(LOG).expect("log parses");
    assert_eq!(events.len(), 4);

    let controller = CacheController::replay(CacheConfig::default(), events);
    let fingerprint = Fingerprint::from_raw("search?q=ports");
    let view = controller.select(&fingerprint);

    assert_eq!(view.state, ListState::MoreFailed);
    assert_eq!(
        view.error.as_ref().and_then(|error| error.status),
        Some(503)
    );
    assert!(controller.window(&fingerprint).can_retry_next());

    let ready = CacheController::replay(
        CacheConfig::default(),
        parse_event_log(LOG)
            .expect("log parses")
            .into_iter()
            .take(2),
    );
    insta::assert_json_snapshot!(ready.select(&fingerprint), @r#"
    {
      "state": "ready",
      "results": [
        {
          "id": "a",
          "kind": "entity",
          "name": "Ada"
        },
        {
          "id": "b",
          "kind": "entity"
        }
      ],
      "missing": 0,
      "has_more": true
    }
    "#);
}

#[tokio::test]
async fn recorded_history_reproduces_state() {
    let mut original = CacheController::default();
    drive(&mut original);

    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("session.jsonl");
    let history: Vec<_> = original.history().cloned().collect();
    write_event_log(&path, &history).await.expect("write log");

    let events = read_event_log(&path).await.expect("read log");
    assert_eq!(events.len(), history.len());
    let replayed = CacheController::replay(CacheConfig::default(), events);

    assert_eq!(replayed.state().version(), original.state().version());
    assert_eq!(replayed.state().generation(), original.state().generation());
    assert_eq!(replayed.state().window_count(), 0);
    assert!(
        replayed
            .object(&RecordId::from("c"))
            .is_loaded()
    );
    assert!(replayed.object(&RecordId::from("b")).should_load());
    assert_eq!(
        replayed.object(&RecordId::from("a")).record,
        original.object(&RecordId::from("a")).record
    );
}

#[test]
fn disabled_history_records_nothing() {
    let config = CacheConfig {
        history_limit: 0,
        ..Default::default()
    };
    let mut controller = CacheController::new(config);
    drive(&mut controller);

    assert_eq!(controller.history().count(), 0);
    assert!(controller.state().version() > 0);
}
