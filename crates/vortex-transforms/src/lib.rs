//! The built-in document transform stages and their default registration order.

mod flatten;
mod horizon;

pub use horizon::{
    AddEventUnderscoreIdField, AddTimestampIfDropped, DeleteFlatKeys, DropEventData,
    DropHttpHeaders, EnrichPropertiesFromHttpHeaders, Flatten, MoveTimestamp,
    RenameAdditionalFields, UpdateModifiedTime,
};
use vortex_core::Registry;

/// The fixed set of flat keys dropped by [`DeleteFlatKeys`] once [`Flatten`] has run.
const FLAT_KEYS_TO_DELETE: [&str; 5] = [
    "event.source",
    "event.specversion",
    "event.datacontenttype",
    "event.dataref",
    "uuid",
];

/// Builds the registry used in production: the 9 stages in the fixed order the
/// upsert path requires, ending in a flattened, trimmed document ready for the
/// store. [`MoveTimestamp`] is deliberately left unregistered.
pub fn default_registry() -> Registry {
    let mut registry = Registry::new();
    registry
        .register(Box::new(RenameAdditionalFields))
        .register(Box::new(EnrichPropertiesFromHttpHeaders))
        .register(Box::new(DropHttpHeaders))
        .register(Box::new(DropEventData))
        .register(Box::new(AddTimestampIfDropped))
        .register(Box::new(UpdateModifiedTime))
        .register(Box::new(AddEventUnderscoreIdField))
        .register(Box::new(Flatten))
        .register(Box::new(DeleteFlatKeys::new(FLAT_KEYS_TO_DELETE)));
    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn kafka_message() -> serde_json::Value {
        json!({
            "event": {
                "id": "e1",
                "data": {"k": "v"},
                "time": "2024-01-01T00:00:00Z",
                "source": "svc",
                "specversion": "1.0",
                "datacontenttype": "application/json",
                "dataref": "ref"
            },
            "additionalFields": {"x-request-id": "abc"},
            "httpHeaders": {
                "x-correlation-id": ["somecorrelation"],
                "x-business-context": ["somecontext"]
            },
            "status": "DROPPED",
            "uuid": "u1"
        })
    }

    #[test]
    fn default_registry_runs_stages_in_documented_order() {
        let registry = default_registry();
        assert_eq!(
            registry.stage_names(),
            vec![
                "rename_additional_fields",
                "enrich_properties_from_http_headers",
                "drop_http_headers",
                "drop_event_data",
                "add_timestamp_if_dropped",
                "update_modified_time",
                "add_event_underscore_id_field",
                "flatten",
                "delete_flat_keys",
            ]
        );
    }

    #[test]
    fn default_registry_produces_a_flat_trimmed_document() {
        let registry = default_registry();
        let result = registry.apply(kafka_message()).expect("registry should succeed");
        let object = result.as_object().expect("result is an object");

        for (key, value) in object {
            assert!(!value.is_object(), "expected '{key}' to be flattened");
        }

        assert!(object.get("event.source").is_none());
        assert!(object.get("event.specversion").is_none());
        assert!(object.get("event.datacontenttype").is_none());
        assert!(object.get("event.dataref").is_none());
        assert!(object.get("uuid").is_none());
        assert!(object.get("httpHeaders").is_none());
        assert!(object.get("additionalFields").is_none());
        assert!(object.get("event.data").is_none());

        assert_eq!(object.get("event.id"), Some(&json!("e1")));
        assert_eq!(object.get("event._id"), Some(&json!("e1")));
        assert_eq!(object.get("properties.x-correlation-id"), Some(&json!("somecorrelation")));
        assert!(object.contains_key("timestamp"));
        assert!(object.contains_key("modified"));
    }

    #[test]
    fn default_registry_is_idempotent_on_its_own_output() {
        let registry = default_registry();
        let once = registry.apply(kafka_message()).unwrap();
        let twice = registry.apply(once.clone());
        assert!(twice.is_err(), "re-running on an already-flattened document should fault on drop_event_data");
    }
}
