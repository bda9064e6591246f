//! `ember status`: one unauthenticated poll, printed.

use std::time::Duration;

use ember_api::{DeviceClient, StatusDocument, TransportConfig};
use ember_core::{Leaf, flatten};
use serde::Serialize;
use serde_json::Value;
use tabled::Tabled;

use crate::cli::{GlobalOpts, StatusArgs};
use crate::config;
use crate::error::CliError;
use crate::output;

#[derive(Debug, Serialize)]
struct PointOut {
    id: String,
    value: Value,
}

#[derive(Tabled)]
struct PointRow {
    #[tabled(rename = "Point")]
    id: String,
    #[tabled(rename = "Value")]
    value: String,
}

impl From<Leaf> for PointOut {
    fn from(leaf: Leaf) -> Self {
        Self {
            id: leaf.id,
            value: leaf.value,
        }
    }
}

pub async fn handle(args: StatusArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let cfg = config::load(global)?;
    let host = cfg.device.host.as_deref().ok_or_else(|| CliError::NoConfig {
        path: config::active_path(global).display().to_string(),
    })?;
    let url = ember_config::parse_device_url(host)?;

    let transport =
        TransportConfig::default().with_timeout(Duration::from_secs(cfg.device.timeout));
    let client = DeviceClient::new(url, &transport)?;
    let doc = client.poll_status().await?;

    let rendered = if args.raw {
        output::render_single(&global.output, &doc, |d: &StatusDocument| {
            serde_json::to_string_pretty(d).unwrap_or_default()
        })?
    } else {
        let points: Vec<PointOut> = flatten(doc.fields(), "")
            .into_iter()
            .filter(|leaf| {
                args.filter
                    .as_deref()
                    .is_none_or(|prefix| leaf.id.starts_with(prefix))
            })
            .map(PointOut::from)
            .collect();

        output::render_list(
            &global.output,
            &points,
            |p| PointRow {
                id: p.id.clone(),
                value: output::display_value(&p.value),
            },
            |p| format!("{}={}", p.id, output::display_value(&p.value)),
        )?
    };

    output::print_output(&rendered, global.quiet);
    Ok(())
}
