//! `schema` command handler.

use sellerdash_core::{ReportType, SchemaDescriptor, TypeRegistry};

/// The CSV header line an upload of this type must start with.
pub(crate) fn template_header(descriptor: &SchemaDescriptor) -> String {
    descriptor.column_names().join(",")
}

/// Print the column template, natural key and row rules for `report_type`.
///
/// # Errors
///
/// Returns an error if the registry has no descriptor for `report_type`.
pub(crate) fn run_schema(registry: &TypeRegistry, report_type: ReportType) -> anyhow::Result<()> {
    let descriptor = registry.descriptor_for(report_type)?;

    println!("{}", template_header(descriptor));
    println!();
    println!("{:<28}{:<10}{:<5}DESCRIPTION", "COLUMN", "TYPE", "KEY");
    for column in &descriptor.columns {
        let key = if descriptor.is_key_column(column.name) { "yes" } else { "" };
        println!(
            "{:<28}{:<10}{:<5}{}",
            column.name,
            column.semantic_type.to_string(),
            key,
            column.description
        );
    }
    if descriptor.order_significant {
        println!();
        println!("columns must appear in exactly this order");
    }
    if !descriptor.semantic_rules.is_empty() {
        println!();
        println!("row rules:");
        for rule in &descriptor.semantic_rules {
            println!("  {:<32}{}", rule.name, rule.message);
        }
    }
    Ok(())
}
