use std::collections::BTreeMap;

use metrics_model::MetricFamily;

use crate::error::TransformError;
use crate::Transform;

/// Renames a family according to a fixed `old name -> new name` table.
/// Families whose name isn't in the table are left unchanged.
pub struct RenameMetrics {
    table: BTreeMap<String, String>,
}

impl RenameMetrics {
    pub fn new(table: BTreeMap<String, String>) -> Self {
        RenameMetrics { table }
    }
}

impl Transform for RenameMetrics {
    fn apply(&self, family: &mut MetricFamily) -> Result<bool, TransformError> {
        if let Some(renamed) = self.table.get(&family.name) {
            family.name = renamed.clone();
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use metrics_model::MetricType;

    #[test]
    fn renames_a_family_present_in_the_table() {
        let mut table = BTreeMap::new();
        table.insert("old_name".to_string(), "new_name".to_string());
        let transform = RenameMetrics::new(table);

        let mut family = MetricFamily::new("old_name", MetricType::Gauge);
        transform.apply(&mut family).unwrap();
        assert_eq!(family.name, "new_name");
    }

    #[test]
    fn leaves_unmapped_families_unchanged() {
        let transform = RenameMetrics::new(BTreeMap::new());
        let mut family = MetricFamily::new("untouched", MetricType::Gauge);
        transform.apply(&mut family).unwrap();
        assert_eq!(family.name, "untouched");
    }
}
