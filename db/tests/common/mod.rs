//! Shared record types for the store integration tests.

#![allow(dead_code)]

use keel_db::{Database, IndexKey, IndexSpec, Object};
use keel_primitives::ObjectId;
use serde::Serialize;

/// Record with a unique name index and a non-unique group index.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Widget {
    pub id: ObjectId,
    pub name: String,
    pub group: u64,
}

impl Object for Widget {
    const SPACE_ID: u8 = 1;
    const TYPE_ID: u8 = 40;
    const TYPE_NAME: &'static str = "widget";

    fn id(&self) -> ObjectId {
        self.id
    }

    fn set_id(&mut self, id: ObjectId) {
        self.id = id;
    }

    fn indices() -> Vec<IndexSpec<Self>> {
        vec![
            IndexSpec::unique("by_name", |w: &Widget| IndexKey::str(&w.name)),
            IndexSpec::non_unique("by_group", |w: &Widget| {
                IndexKey::u64(w.group).push_u64(w.id.instance)
            }),
        ]
    }
}

pub fn widget_db() -> Database {
    let mut db = Database::new();
    db.add_table::<Widget>().expect("register widget table");
    db
}

/// Every record is reachable through every index, and no index holds extra
/// entries.
pub fn assert_indices_consistent(db: &Database) {
    let table = db.table::<Widget>().unwrap();
    assert_eq!(table.index_len("by_name").unwrap(), table.len());
    assert_eq!(table.index_len("by_group").unwrap(), table.len());
    for w in table.iter() {
        let by_name = table.find_by("by_name", &IndexKey::str(&w.name)).unwrap().unwrap();
        assert_eq!(by_name, w);
        let key = IndexKey::u64(w.group).push_u64(w.id.instance);
        let by_group = table.find_by("by_group", &key).unwrap().unwrap();
        assert_eq!(by_group, w);
    }
}
