use anyhow::Result;
use serde_json::json;

use pagesense::roles::ROLE_CODES;
use pagesense::serializer::legend;
use pagesense::types::OutputFormat;

pub fn handle_legend(format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            let roles: serde_json::Map<String, serde_json::Value> = ROLE_CODES
                .iter()
                .map(|(role, code)| (role.to_string(), json!(code)))
                .collect();
            let output = json!({
                "legend": legend(),
                "roles": roles,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Simple => println!("{}", legend()),
    }
    Ok(())
}
