use crate::package::{PackageDescriptor, PackageTable};

/// Print every known package with its variants (default marked `*`).
pub fn packages(table: &PackageTable) {
    let rows: Vec<(String, String, &str)> = table
        .iter()
        .map(|d| (d.name.clone(), variants(d), d.description.as_str()))
        .collect();
    let name_width = rows.iter().map(|r| r.0.len()).max().unwrap_or(0);
    let variant_width = rows.iter().map(|r| r.1.len()).max().unwrap_or(0);

    for (name, variants, description) in rows {
        println!(
            "{:name_width$}  {:variant_width$}  {}",
            name, variants, description
        );
    }
}

fn variants(descriptor: &PackageDescriptor) -> String {
    if descriptor.variants.is_empty() {
        return "-".to_string();
    }
    descriptor
        .variants
        .iter()
        .map(|v| {
            if descriptor.default_variant.as_ref() == Some(v) {
                format!("{}*", v)
            } else {
                v.clone()
            }
        })
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_variants_column() {
        let table = PackageTable::builtin().unwrap();
        assert_eq!(variants(table.get("openblas").unwrap()), "lp64*,ilp64");
        assert_eq!(variants(table.get("openmpi").unwrap()), "lp64,ilp64");
        assert_eq!(variants(table.get("cmake").unwrap()), "-");
    }
}
