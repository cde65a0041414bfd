use std::time::{SystemTime, UNIX_EPOCH};

use time::macros::date;

use super::{make_refname, RefMatch, Store, StoreError, TypeDefinition};
use crate::db::open_connection;

fn unique_db_path() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before UNIX_EPOCH")
        .as_nanos();
    std::env::temp_dir()
        .join(format!("milepost-store-{}.sqlite", nanos))
        .display()
        .to_string()
}

fn cleanup_db_files(path: &str) {
    for suffix in ["", "-wal", "-shm"] {
        let _ = std::fs::remove_file(format!("{path}{suffix}"));
    }
}

fn open_store(path: &str) -> Store {
    let conn = open_connection(path).expect("connection should open");
    Store::open(conn, vec!["milestone".to_string(), "task".to_string()])
        .expect("store should open")
}

fn pairs(raw: &[(&str, &str)]) -> Vec<(String, String)> {
    raw.iter()
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect()
}

#[test]
fn refname_slug_strips_and_lowercases() {
    assert_eq!(make_refname("Laser \"Bench\" Ready"), "laserbenchready");
    assert_eq!(make_refname("it's due"), "itsdue");
}

#[test]
fn add_generates_refname_id_and_initial_event() {
    let path = unique_db_path();
    let mut store = open_store(&path);

    let refname = store
        .add(
            &pairs(&[
                ("description", "Receiver installed"),
                ("value", "20/06/01"),
                ("owner", "deshler"),
            ]),
            "tester",
        )
        .expect("add should succeed");
    assert_eq!(refname, "receiverinstalled");

    let record = store.get("receiverinstalled").expect("record should load");
    assert_eq!(record.id, 1);
    assert_eq!(record.value, "20/06/01");
    assert_eq!(record.owner, ["deshler"]);
    assert_eq!(record.updates.len(), 1);
    assert_eq!(record.updates[0].level, 0);
    assert_eq!(record.updates[0].note, "Initial");
    assert_eq!(record.updates[0].by, "tester");
    assert_eq!(record.initialized, record.updated);

    cleanup_db_files(&path);
}

#[test]
fn add_requires_description_and_value() {
    let path = unique_db_path();
    let mut store = open_store(&path);

    let missing_value = store.add(&pairs(&[("description", "Thing")]), "tester");
    assert!(matches!(missing_value, Err(StoreError::MissingField("value"))));

    let missing_description = store.add(&pairs(&[("value", "20/01/01")]), "tester");
    assert!(matches!(
        missing_description,
        Err(StoreError::MissingField("description"))
    ));

    cleanup_db_files(&path);
}

#[test]
fn near_duplicate_descriptions_widen_the_slug() {
    let path = unique_db_path();
    let mut store = open_store(&path);

    let long_a = "Integrate the northern antenna receiver chain alpha";
    let long_b = "Integrate the northern antenna receiver chain bravo";
    let first = store
        .add(&pairs(&[("description", long_a), ("value", "20/01/01")]), "t")
        .unwrap();
    let second = store
        .add(&pairs(&[("description", long_b), ("value", "20/02/01")]), "t")
        .unwrap();
    assert_ne!(first, second);
    assert!(second.len() > first.len());

    cleanup_db_files(&path);
}

#[test]
fn identical_descriptions_never_get_a_refname() {
    let path = unique_db_path();
    let mut store = open_store(&path);

    store
        .add(&pairs(&[("description", "Same thing"), ("value", "20/01/01")]), "t")
        .unwrap();
    let clash = store.add(
        &pairs(&[("description", "Same thing"), ("value", "20/02/01")]),
        "t",
    );
    assert!(matches!(clash, Err(StoreError::NoUniqueName(_))));

    cleanup_db_files(&path);
}

#[test]
fn update_appends_audit_levels_with_prior_values() {
    let path = unique_db_path();
    let mut store = open_store(&path);

    store
        .add(
            &pairs(&[("description", "Dish aligned"), ("value", "20/06/01")]),
            "t",
        )
        .unwrap();
    store
        .update(
            "dishaligned",
            &pairs(&[("value", "20/07/01")]),
            "slipped a month",
            "t",
        )
        .unwrap();
    store
        .update("dishaligned", &pairs(&[("status", "complete")]), "", "t")
        .unwrap();

    let record = store.get("dishaligned").unwrap();
    assert_eq!(record.value, "20/07/01");
    assert_eq!(record.status.as_deref(), Some("complete"));
    assert_eq!(record.updates.len(), 3);
    assert_eq!(record.updates[1].level, 1);
    assert_eq!(record.updates[2].level, 2);
    assert!(record.updates[1].note.contains("slipped a month"));
    assert!(record.updates[1].note.contains("[value: 20/06/01]"));

    cleanup_db_files(&path);
}

#[test]
fn rejected_changes_leave_the_audit_trail_untouched() {
    let path = unique_db_path();
    let mut store = open_store(&path);

    store
        .add(
            &pairs(&[("description", "Fixed thing"), ("value", "20/06/01")]),
            "t",
        )
        .unwrap();
    store
        .update(
            "fixedthing",
            &pairs(&[("refname", "other"), ("id", "99")]),
            "",
            "t",
        )
        .unwrap();

    let record = store.get("fixedthing").unwrap();
    assert_eq!(record.refname, "fixedthing");
    assert_eq!(record.id, 1);
    assert_eq!(record.updates.len(), 1);
    assert_eq!(record.updates[0].note, "Initial");

    cleanup_db_files(&path);
}

#[test]
fn owner_updates_append_instead_of_overwriting() {
    let path = unique_db_path();
    let mut store = open_store(&path);

    store
        .add(
            &pairs(&[
                ("description", "Cryostat cold"),
                ("value", "20/06/01"),
                ("owner", "ito"),
            ]),
            "t",
        )
        .unwrap();
    store
        .update("cryostatcold", &pairs(&[("owner", "vieira")]), "", "t")
        .unwrap();
    store
        .update("cryostatcold", &pairs(&[("owner", "ito")]), "", "t")
        .unwrap();

    let record = store.get("cryostatcold").unwrap();
    assert_eq!(record.owner, ["ito", "vieira"]);

    cleanup_db_files(&path);
}

#[test]
fn trace_suffix_fields_link_traces() {
    let path = unique_db_path();
    let mut store = open_store(&path);

    store
        .add(
            &pairs(&[("description", "Beam mapped"), ("value", "20/06/01")]),
            "t",
        )
        .unwrap();
    store
        .update(
            "beammapped",
            &pairs(&[("taskTrace", "dishaligned")]),
            "",
            "t",
        )
        .unwrap();

    let record = store.get("beammapped").unwrap();
    assert_eq!(record.traces["task"], ["dishaligned"]);

    cleanup_db_files(&path);
}

#[test]
fn name_resolution_reports_ambiguity_and_absence() {
    let path = unique_db_path();
    let mut store = open_store(&path);

    store
        .add(&pairs(&[("description", "Filter bank A"), ("value", "20/01/01")]), "t")
        .unwrap();
    store
        .add(&pairs(&[("description", "Filter bank B"), ("value", "20/02/01")]), "t")
        .unwrap();

    assert_eq!(
        store.find_matching_refname("FILTERBANKA"),
        RefMatch::Exact("filterbanka".to_string())
    );
    assert!(matches!(
        store.find_matching_refname("filterbank"),
        RefMatch::Candidates(ref c) if c.len() == 2
    ));
    assert_eq!(store.find_matching_refname("nothing"), RefMatch::None);

    let ambiguous = store.update("filterbank", &pairs(&[("status", "moved")]), "", "t");
    assert!(matches!(ambiguous, Err(StoreError::Ambiguous { .. })));
    let absent = store.update("nothing", &pairs(&[("status", "moved")]), "", "t");
    assert!(matches!(absent, Err(StoreError::NotFound(_))));

    cleanup_db_files(&path);
}

#[test]
fn type_definitions_expand_into_quarters() {
    let definition = TypeDefinition {
        name: "program".to_string(),
        description: "Funded program".to_string(),
        start: "19/11/15".to_string(),
        duration_months: 6,
    };
    let quarters = definition.quarters();
    assert_eq!(quarters.len(), 2);
    assert_eq!(quarters[0].0, date!(2019 - 11 - 15));
    assert_eq!(quarters[1].1, date!(2020 - 05 - 14));

    let unscheduled = TypeDefinition {
        start: "tbd".to_string(),
        ..definition
    };
    assert!(unscheduled.quarters().is_empty());
}

#[test]
fn changed_since_filters_on_audit_dates() {
    let path = unique_db_path();
    let mut store = open_store(&path);

    store
        .add(&pairs(&[("description", "Recent work"), ("value", "20/01/01")]), "t")
        .unwrap();

    // All events carry today's stamp, so yesterday matches and tomorrow
    // does not.
    assert_eq!(store.changed_since(date!(2000 - 01 - 01)).len(), 1);
    assert_eq!(store.changed_since(date!(2999 - 01 - 01)).len(), 0);

    cleanup_db_files(&path);
}
