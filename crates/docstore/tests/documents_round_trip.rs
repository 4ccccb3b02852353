use docstore::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
struct Account {
    id: i64,
    name: String,
    balance: i64,
}

const BY_ID: KeyPath<Account, i64> = KeyPath::new("id");

fn account(id: i64, name: &str, balance: i64) -> Account {
    Account {
        id,
        name: name.to_string(),
        balance,
    }
}

#[test]
fn documents_survive_a_round_trip() {
    let conn = Connection::open_memory().expect("open in-memory db");
    let accounts = conn.get_table("accounts").expect("get table");

    let original = account(1, "alice", 100);
    accounts.add(&original).unwrap();

    let retrieved = accounts.find(BY_ID, &1).unwrap();
    assert_eq!(retrieved, original);
}

#[test]
fn full_document_lifecycle_scenario() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("store.db");
    let conn = Connection::open(&SqliteConfig::file(path.to_string_lossy())).unwrap();

    let table = conn.get_table("t").unwrap();

    table.add(&account(1, "a", 0)).unwrap();
    assert_eq!(table.find(BY_ID, &1).unwrap(), account(1, "a", 0));

    table.update(&account(1, "b", 0), BY_ID).unwrap();
    assert_eq!(table.find(BY_ID, &1).unwrap(), account(1, "b", 0));

    table.delete(BY_ID, &1).unwrap();
    assert!(!table.exists(BY_ID, &1).unwrap());
    assert_eq!(table.count_long().unwrap(), 0);

    conn.dispose();
}

#[test]
fn count_tracks_distinct_inserts_and_clear() {
    let conn = Connection::open_memory().unwrap();
    let table = conn.get_table("accounts").unwrap();

    for i in 0..10 {
        table.add(&account(i, "holder", i * 10)).unwrap();
    }
    assert_eq!(table.count().unwrap(), 10);
    assert_eq!(table.count_long().unwrap(), 10);

    table.clear().unwrap();
    assert_eq!(table.count_long().unwrap(), 0);
}

#[test]
fn exists_flips_with_add_and_delete() {
    let conn = Connection::open_memory().unwrap();
    let table = conn.get_table("accounts").unwrap();

    assert!(!table.exists(BY_ID, &5).unwrap());
    table.add(&account(5, "e", 0)).unwrap();
    assert!(table.exists(BY_ID, &5).unwrap());

    table.delete(BY_ID, &5).unwrap();
    assert!(!table.exists(BY_ID, &5).unwrap());

    // Idempotent delete on an absent key must not fail.
    table.delete(BY_ID, &5).unwrap();
}

#[test]
fn all_deserializes_every_stored_document() {
    let conn = Connection::open_memory().unwrap();
    let table = conn.get_table("accounts").unwrap();

    let docs: Vec<Account> = (0..4).map(|i| account(i, "x", i)).collect();
    table.add_all(&docs).unwrap();

    let mut loaded: Vec<Account> = table.all().unwrap();
    loaded.sort_by_key(|a| a.id);
    assert_eq!(loaded, docs);
}

#[test]
fn string_keys_compare_in_their_native_type() {
    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Tagged {
        tag: String,
        weight: i64,
    }
    const BY_TAG: KeyPath<Tagged, String> = KeyPath::new("tag");

    let conn = Connection::open_memory().unwrap();
    let table = conn.get_table("tagged").unwrap();

    table
        .add(&Tagged {
            tag: "red".to_string(),
            weight: 3,
        })
        .unwrap();

    let found = table.find(BY_TAG, &"red".to_string()).unwrap();
    assert_eq!(found.weight, 3);
    assert!(!table.exists(BY_TAG, &"blue".to_string()).unwrap());
}

#[test]
fn nested_paths_address_sub_documents() {
    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Address {
        city: String,
    }
    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Customer {
        id: i64,
        address: Address,
    }
    const BY_CITY: KeyPath<Customer, String> = KeyPath::new("address.city");
    const BY_ID: KeyPath<Customer, i64> = KeyPath::new("id");
    const ADDRESS: KeyPath<Customer, Address> = KeyPath::new("address");

    let conn = Connection::open_memory().unwrap();
    let table = conn.get_table("customers").unwrap();

    table
        .add(&Customer {
            id: 1,
            address: Address {
                city: "Oslo".to_string(),
            },
        })
        .unwrap();

    let found = table.find(BY_CITY, &"Oslo".to_string()).unwrap();
    assert_eq!(found.id, 1);

    // A sub-document extracts without deserializing the whole document.
    let address: Option<Address> = table.find_property(BY_ID, ADDRESS, &1).unwrap();
    assert_eq!(
        address,
        Some(Address {
            city: "Oslo".to_string()
        })
    );
}
