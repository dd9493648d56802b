use std::collections::HashMap;

use serde::Serialize;
use tracing::warn;

use crate::{
    deal::Deal,
    stage::{Stage, StageId, StageRegistry},
};

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct BoardColumn {
    pub stage: Stage,
    pub deals: Vec<Deal>,
    pub count: usize,
    pub total_value: i64,
    pub expected_value: i64,
}

impl BoardColumn {
    fn empty(stage: &Stage) -> Self {
        Self {
            stage: stage.clone(),
            deals: Vec::new(),
            count: 0,
            total_value: 0,
            expected_value: 0,
        }
    }

    fn push(&mut self, deal: &Deal) {
        self.count += 1;
        self.total_value = self.total_value.saturating_add(deal.value_or_zero());
        self.expected_value = self.expected_value.saturating_add(deal.expected_value());
        self.deals.push(deal.clone());
    }
}

/// Read model of the board: one column per registered stage.
///
/// Totals cover the columns only; deals parked in `uncategorized` are
/// reported separately.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct BoardView {
    pub columns: Vec<BoardColumn>,
    pub uncategorized: Vec<Deal>,
    pub total_count: usize,
    pub total_value: i64,
    pub total_expected_value: i64,
}

impl BoardView {
    pub fn column(&self, stage: &StageId) -> Option<&BoardColumn> {
        self.columns.iter().find(|column| &column.stage.id == stage)
    }
}

/// Groups `deals` into the registry's columns, keeping input order within a
/// column. An empty `search` keeps every deal; otherwise only deals whose
/// title or contact contains it verbatim, ignoring case. Whitespace counts.
pub fn group_by_stage(registry: &StageRegistry, deals: &[Deal], search: &str) -> BoardView {
    let needle = normalize_search(search);
    let mut columns: Vec<BoardColumn> = registry
        .ordered_stages()
        .iter()
        .map(BoardColumn::empty)
        .collect();
    let index: HashMap<StageId, usize> = registry
        .ordered_stages()
        .iter()
        .enumerate()
        .map(|(position, stage)| (stage.id.clone(), position))
        .collect();

    let mut uncategorized = Vec::new();
    let matching = deals.iter().filter(|deal| match needle.as_deref() {
        Some(needle) => deal.matches_search(needle),
        None => true,
    });
    for deal in matching {
        match index.get(&deal.stage) {
            Some(position) => columns[*position].push(deal),
            None => uncategorized.push(deal.clone()),
        }
    }

    if !uncategorized.is_empty() {
        warn!(
            count = uncategorized.len(),
            "deals reference stages missing from the pipeline"
        );
    }

    let total_count = columns.iter().map(|column| column.count).sum();
    let total_value = columns
        .iter()
        .fold(0_i64, |sum, column| sum.saturating_add(column.total_value));
    let total_expected_value = columns
        .iter()
        .fold(0_i64, |sum, column| sum.saturating_add(column.expected_value));
    BoardView {
        columns,
        uncategorized,
        total_count,
        total_value,
        total_expected_value,
    }
}

fn normalize_search(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deals() -> Vec<Deal> {
        vec![
            Deal::new("d1", "Acme renewal", "Qualification", 10)
                .with_value(5_000)
                .with_contact("jane@acme.test"),
            Deal::new("d2", "Globex pilot", "Qualification", 10),
            Deal::new("d3", "Initech upsell", "Negotiation", 80)
                .with_value(12_000)
                .with_contact("bill@initech.test"),
            Deal::new("d4", "Hooli expansion", "Closed Won", 100).with_value(40_000),
            Deal::new("d5", "Umbrella audit", "Archived", 50).with_value(700),
        ]
    }

    #[test]
    fn renders_every_stage_in_order_including_empty_columns() {
        let registry = StageRegistry::default();
        let view = group_by_stage(&registry, &[], "");
        let keys: Vec<&str> = view
            .columns
            .iter()
            .map(|column| column.stage.id.as_str())
            .collect();
        let expected: Vec<&str> = registry
            .ordered_stages()
            .iter()
            .map(|stage| stage.id.as_str())
            .collect();
        assert_eq!(keys, expected);
        assert!(view.columns.iter().all(|column| column.count == 0));
        assert_eq!(view.total_value, 0);
    }

    #[test]
    fn counts_and_sums_match_each_stage_subset() {
        let registry = StageRegistry::default();
        let deals = deals();
        let view = group_by_stage(&registry, &deals, "");
        for stage in registry.ordered_stages() {
            let subset: Vec<&Deal> = deals.iter().filter(|d| d.stage == stage.id).collect();
            let column = view.column(&stage.id).unwrap();
            assert_eq!(column.count, subset.len());
            assert_eq!(column.deals.len(), subset.len());
            assert_eq!(
                column.total_value,
                subset.iter().map(|d| d.value.unwrap_or(0)).sum::<i64>()
            );
        }
        let qualification = view.column(&StageId::from("Qualification")).unwrap();
        assert_eq!(qualification.total_value, 5_000);
        assert_eq!(qualification.expected_value, 500);
        assert_eq!(
            qualification
                .deals
                .iter()
                .map(|d| d.id.as_str())
                .collect::<Vec<_>>(),
            ["d1", "d2"]
        );
        assert_eq!(view.total_count, 4);
        assert_eq!(view.total_value, 57_000);
        assert_eq!(view.total_expected_value, 500 + 9_600 + 40_000);
    }

    #[test]
    fn unknown_stages_are_surfaced_not_dropped() {
        let registry = StageRegistry::default();
        let view = group_by_stage(&registry, &deals(), "");
        assert_eq!(view.uncategorized.len(), 1);
        assert_eq!(view.uncategorized[0].id.as_str(), "d5");
        assert!(view.column(&StageId::from("Archived")).is_none());
    }

    #[test]
    fn search_keeps_only_title_or_contact_matches() {
        let registry = StageRegistry::default();
        let deals = deals();
        let view = group_by_stage(&registry, &deals, "ACME");
        let shown: Vec<&str> = view
            .columns
            .iter()
            .flat_map(|column| column.deals.iter().map(|d| d.id.as_str()))
            .collect();
        assert_eq!(shown, ["d1"]);

        let by_contact = group_by_stage(&registry, &deals, "initech.TEST");
        assert_eq!(by_contact.total_count, 1);
        assert_eq!(
            by_contact
                .column(&StageId::from("Negotiation"))
                .unwrap()
                .count,
            1
        );

        let none = group_by_stage(&registry, &deals, "zzz");
        assert_eq!(none.total_count, 0);
        assert_eq!(none.columns.len(), registry.len());
        assert!(none.uncategorized.is_empty());
    }

    #[test]
    fn whitespace_is_part_of_the_search_term() {
        let registry = StageRegistry::default();
        let acme = vec![Deal::new("d1", "Acme", "Qualification", 10)];
        assert_eq!(group_by_stage(&registry, &acme, " ").total_count, 0);
        assert_eq!(group_by_stage(&registry, &acme, "").total_count, 1);

        let deals = deals();
        assert_eq!(group_by_stage(&registry, &deals, "  ACME ").total_count, 0);
        let spaced = group_by_stage(&registry, &deals, "e r");
        assert_eq!(spaced.total_count, 1);
        assert_eq!(spaced.columns[1].deals[0].id.as_str(), "d1");
    }

    #[test]
    fn totals_saturate_instead_of_overflowing() {
        let registry = StageRegistry::default();
        let deals = vec![
            Deal::new("d1", "Big one", "Closed Won", 100).with_value(i64::MAX),
            Deal::new("d2", "Big two", "Closed Won", 100).with_value(i64::MAX),
            Deal::new("d3", "Small", "Prospecting", 10).with_value(10),
        ];
        let view = group_by_stage(&registry, &deals, "");
        let won = view.column(&StageId::from("Closed Won")).unwrap();
        assert_eq!(won.total_value, i64::MAX);
        assert_eq!(won.expected_value, i64::MAX);
        assert_eq!(view.total_value, i64::MAX);
        assert_eq!(view.total_count, 3);
    }
}
