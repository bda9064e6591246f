// ── Status document → host state points ──
//
// Flattens the nested status document into `device.<path>` points and
// publishes every point whose value changed. Arrays are stored as their
// compact JSON text; objects are never points themselves. The walk is
// iterative, so nesting depth is bounded by memory, not by the stack.

use ember_api::StatusDocument;
use ember_api::status::{scalar_to_string, truthy};
use serde_json::{Map, Value};
use strum::IntoEnumIterator;
use tracing::{debug, info, warn};

use crate::command::CommandPoint;
use crate::error::CoreError;
use crate::host::{Host, HostError, ObjectMeta, ValueType};

/// Root segment of every state point id.
pub const ROOT: &str = "device";

pub const NONCE_ID: &str = "device.meta.nonce";
pub const HW_VERSION_ID: &str = "device.meta.hw_version";
pub const SW_VERSION_ID: &str = "device.meta.sw_version";
pub const ECO_EDITABLE_ID: &str = "device.meta.eco_editable";

/// A flattened leaf of the status document.
#[derive(Debug, Clone, PartialEq)]
pub struct Leaf {
    pub id: String,
    pub value: Value,
}

/// What one synchronization pass saw and did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncOutcome {
    /// Leaves visited.
    pub visited: usize,
    /// Points whose value was (re)published.
    pub published: usize,
    /// Leaves without a host object.
    pub missing: Vec<String>,
    pub nonce: Option<String>,
    pub hw_version: Option<String>,
    pub sw_version: Option<String>,
    pub eco_editable: Option<bool>,
}

/// Storage form of a leaf value: arrays become compact JSON text.
pub fn coerce(value: &Value) -> Value {
    match value {
        Value::Array(_) => Value::String(value.to_string()),
        Value::Null | Value::Bool(_) | Value::Number(_) | Value::String(_) | Value::Object(_) => {
            value.clone()
        }
    }
}

fn root_path(prefix: &str) -> String {
    let prefix = prefix.trim_matches('.');
    if prefix.is_empty() {
        ROOT.to_owned()
    } else {
        format!("{ROOT}.{prefix}")
    }
}

/// Flatten `fields` into leaves, in document order.
///
/// `prefix` is inserted between the root and the document's own keys;
/// pass `""` for a whole status document.
pub fn flatten(fields: &Map<String, Value>, prefix: &str) -> Vec<Leaf> {
    let mut leaves = Vec::new();
    let mut stack = vec![(root_path(prefix), fields.iter())];

    loop {
        let Some((path, children)) = stack.last_mut() else {
            break;
        };
        let next = children.next().map(|(key, value)| (format!("{path}.{key}"), value));

        match next {
            None => {
                stack.pop();
            }
            Some((id, Value::Object(nested))) => stack.push((id, nested.iter())),
            Some((id, value)) => leaves.push(Leaf {
                id,
                value: coerce(value),
            }),
        }
    }

    leaves
}

/// Host objects for every leaf of `doc`, command points writable.
///
/// Command points the document does not report are added as well, so
/// writes can be accepted before the stove echoes them back.
///
/// The adapter never provisions objects itself; this is for hosts (such
/// as the `ember` binary) that create them from a first status poll.
pub fn discover_objects(doc: &StatusDocument) -> Vec<(String, ObjectMeta)> {
    let mut objects: Vec<(String, ObjectMeta)> = flatten(doc.fields(), "")
        .into_iter()
        .map(|leaf| {
            let name = leaf.id.rsplit('.').next().unwrap_or(&leaf.id).to_owned();
            let value_type = ValueType::of(&leaf.value);
            let meta = if CommandPoint::iter().any(|p| p.as_ref() == leaf.id) {
                ObjectMeta::writable(name, value_type)
            } else {
                ObjectMeta::read_only(name, value_type)
            };
            (leaf.id, meta)
        })
        .collect();

    for point in CommandPoint::iter() {
        let id = point.as_ref();
        if objects.iter().all(|(known, _)| known != id) {
            let name = id.rsplit('.').next().unwrap_or(id);
            objects.push((id.to_owned(), ObjectMeta::writable(name, ValueType::Mixed)));
        }
    }
    objects
}

/// Publish the status document into the host.
///
/// Any host failure aborts the pass; the caller treats it as fatal.
pub async fn sync_state<H: Host + ?Sized>(
    host: &H,
    doc: &StatusDocument,
    prefix: &str,
) -> Result<SyncOutcome, CoreError> {
    let mut outcome = SyncOutcome::default();

    for leaf in flatten(doc.fields(), prefix) {
        outcome.visited += 1;
        intercept(host, &leaf, &mut outcome).await?;
        sync_point(host, &leaf, &mut outcome).await?;
    }

    debug!(
        visited = outcome.visited,
        published = outcome.published,
        missing = outcome.missing.len(),
        "state sync complete"
    );
    Ok(outcome)
}

pub(crate) fn host_error(id: &str) -> impl FnOnce(HostError) -> CoreError + '_ {
    move |e| CoreError::Host {
        id: id.to_owned(),
        message: e.to_string(),
    }
}

async fn sync_point<H: Host + ?Sized>(
    host: &H,
    leaf: &Leaf,
    outcome: &mut SyncOutcome,
) -> Result<(), CoreError> {
    let id = leaf.id.as_str();

    if host.get_object(id).await.map_err(host_error(id))?.is_none() {
        warn!(id, "state point has no host object");
        outcome.missing.push(leaf.id.clone());
        return Ok(());
    }

    let previous = host.get_state(id).await.map_err(host_error(id))?;
    if previous.is_some_and(|s| s.val == leaf.value) {
        return Ok(());
    }

    debug!(id, value = %leaf.value, "publishing");
    host.set_state(id, leaf.value.clone(), true)
        .await
        .map_err(host_error(id))?;
    outcome.published += 1;
    Ok(())
}

/// Side effects of the meta fields. These run whether or not the point
/// has a host object: authentication depends on them.
async fn intercept<H: Host + ?Sized>(
    host: &H,
    leaf: &Leaf,
    outcome: &mut SyncOutcome,
) -> Result<(), CoreError> {
    match leaf.id.as_str() {
        NONCE_ID => outcome.nonce = scalar_to_string(&leaf.value),
        HW_VERSION_ID => outcome.hw_version = scalar_to_string(&leaf.value),
        SW_VERSION_ID => outcome.sw_version = scalar_to_string(&leaf.value),
        ECO_EDITABLE_ID => {
            let editable = truthy(&leaf.value).unwrap_or(false);
            outcome.eco_editable = Some(editable);
            set_writable(host, CommandPoint::EcoMode.as_ref(), editable).await?;
        }
        _ => {}
    }
    Ok(())
}

/// Toggle the `write` capability of an existing object.
async fn set_writable<H: Host + ?Sized>(host: &H, id: &str, writable: bool) -> Result<(), CoreError> {
    let Some(mut meta) = host.get_object(id).await.map_err(host_error(id))? else {
        return Ok(());
    };
    if meta.write == writable {
        return Ok(());
    }
    meta.write = writable;
    host.set_object(id, meta).await.map_err(host_error(id))?;
    info!(id, writable, "updated write capability");
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::host::MemoryHost;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn doc(value: Value) -> StatusDocument {
        match value {
            Value::Object(fields) => StatusDocument::new(fields),
            _ => panic!("test documents must be objects"),
        }
    }

    fn host_with(ids: &[&str]) -> MemoryHost {
        let host = MemoryHost::new();
        for id in ids {
            host.insert_object(*id, ObjectMeta::read_only(*id, ValueType::Mixed));
        }
        host
    }

    #[test]
    fn flattens_nested_maps_and_stringifies_arrays() {
        let d = doc(json!({ "a": { "b": 1, "c": [1, 2] } }));
        let leaves = flatten(d.fields(), "");

        assert_eq!(
            leaves,
            vec![
                Leaf { id: "device.a.b".into(), value: json!(1) },
                Leaf { id: "device.a.c".into(), value: json!("[1,2]") },
            ]
        );
        assert!(leaves.iter().all(|l| l.id != "device.a"));
    }

    #[test]
    fn flatten_keeps_document_order_across_depths() {
        let d = doc(json!({ "z": 1, "m": { "y": { "x": true } }, "a": "last" }));
        let ids: Vec<_> = flatten(d.fields(), "").into_iter().map(|l| l.id).collect();
        assert_eq!(ids, vec!["device.z", "device.m.y.x", "device.a"]);
    }

    #[test]
    fn flatten_with_prefix() {
        let d = doc(json!({ "temp": 21 }));
        let leaves = flatten(d.fields(), "sensors");
        assert_eq!(leaves[0].id, "device.sensors.temp");
    }

    #[test]
    fn flatten_survives_deep_nesting() {
        let mut value = json!(42);
        for _ in 0..2_000 {
            value = json!({ "n": value });
        }
        let Value::Object(fields) = value else { unreachable!() };
        let leaves = flatten(&fields, "");
        assert_eq!(leaves.len(), 1);
        assert_eq!(leaves[0].value, json!(42));
        assert_eq!(leaves[0].id.matches(".n").count(), 2_000);
    }

    #[tokio::test]
    async fn second_identical_sync_publishes_nothing() {
        let host = host_with(&["device.a.b", "device.a.c"]);
        let d = doc(json!({ "a": { "b": 1, "c": [1, 2] } }));

        let first = sync_state(&host, &d, "").await.unwrap();
        assert_eq!(first.published, 2);
        assert_eq!(host.writes_to("device.a.b").len(), 1);
        assert_eq!(host.writes_to("device.a.c").len(), 1);

        let second = sync_state(&host, &d, "").await.unwrap();
        assert_eq!(second.published, 0);
        assert_eq!(host.writes().len(), 2);
    }

    #[tokio::test]
    async fn publishes_with_ack() {
        let host = host_with(&["device.temp"]);
        sync_state(&host, &doc(json!({ "temp": 21 })), "").await.unwrap();
        let state = host.state("device.temp").unwrap();
        assert_eq!(state.val, json!(21));
        assert!(state.ack);
    }

    #[tokio::test]
    async fn missing_objects_are_reported_not_created() {
        let host = host_with(&["device.a"]);
        let outcome = sync_state(&host, &doc(json!({ "a": 1, "x": { "y": 2 } })), "")
            .await
            .unwrap();

        assert_eq!(outcome.missing, vec!["device.x.y".to_owned()]);
        assert!(host.object("device.x.y").is_none());
        assert!(host.state("device.x.y").is_none());
    }

    #[tokio::test]
    async fn meta_fields_are_intercepted() {
        let host = host_with(&[NONCE_ID]);
        let d = doc(json!({
            "meta": { "nonce": 987, "hw_version": "5", "sw_version": "1.42" }
        }));
        let outcome = sync_state(&host, &d, "").await.unwrap();

        assert_eq!(outcome.nonce.as_deref(), Some("987"));
        assert_eq!(outcome.hw_version.as_deref(), Some("5"));
        assert_eq!(outcome.sw_version.as_deref(), Some("1.42"));
        assert_eq!(outcome.missing.len(), 2);
    }

    #[tokio::test]
    async fn eco_editable_drives_eco_mode_writability() {
        let host = host_with(&[ECO_EDITABLE_ID]);
        host.insert_object("device.eco_mode", ObjectMeta::read_only("eco_mode", ValueType::Boolean));

        sync_state(&host, &doc(json!({ "meta": { "eco_editable": true } })), "")
            .await
            .unwrap();
        assert!(host.object("device.eco_mode").unwrap().write);

        sync_state(&host, &doc(json!({ "meta": { "eco_editable": 0 } })), "")
            .await
            .unwrap();
        assert!(!host.object("device.eco_mode").unwrap().write);
    }

    #[tokio::test]
    async fn host_failure_aborts_sync() {
        let host = host_with(&["device.a"]);
        host.set_fail_writes(true);

        let err = sync_state(&host, &doc(json!({ "a": 1 })), "").await.unwrap_err();
        assert!(matches!(err, CoreError::Host { ref id, .. } if id == "device.a"));
    }

    #[test]
    fn discovery_marks_command_points_writable() {
        let d = doc(json!({ "prg": true, "is_temp": 20.5, "meta": { "nonce": "x" } }));
        let objects = discover_objects(&d);

        let prg = &objects.iter().find(|(id, _)| id == "device.prg").unwrap().1;
        assert!(prg.write);
        assert_eq!(prg.value_type, ValueType::Boolean);

        let temp = &objects.iter().find(|(id, _)| id == "device.is_temp").unwrap().1;
        assert!(!temp.write);
        assert_eq!(temp.name, "is_temp");

        let sp_temp = &objects.iter().find(|(id, _)| id == "device.sp_temp").unwrap().1;
        assert!(sp_temp.write);
        assert_eq!(sp_temp.name, "sp_temp");
        assert_eq!(objects.iter().filter(|(id, _)| id == "device.prg").count(), 1);
    }
}
