pub mod interp;

use itertools::Itertools;
use core_lib::config::Settings;
use crate::align::interp::{align_ffill, align_linear};
use crate::model::aligned::{Aligned, AlignedModule, AlignedRack, SeriesSet};
use crate::model::dayraw::DayRaw;
use crate::model::grid::TimeGrid;
use crate::model::matrix::Matrix;
use crate::model::table::ColumnTable;

///
/// Re-sample everything in the day aggregate onto one uniform grid.
///
/// The grid spans the union of every parsed time vector at `TIME_STEP_SEC`
/// spacing. Summary scalars and voltages align linearly, temperatures
/// forward-fill. Racks carrying both voltage and temperature tables get their
/// channel columns partitioned into per-module matrices; racks missing either
/// side keep a summary subtree only.
///
pub fn align_day(day: &DayRaw, settings: &Settings) -> Aligned {
    let grid = build_grid(day, settings.time_step_sec());

    if grid.is_empty() {
        log::info!("No parsed timestamps - producing an empty aligned tree");
        return Aligned::empty(settings.time_step_sec())
    }

    let mut aligned = Aligned::new(grid.clone());

    if let Some(bank) = day.bank_summary() {
        aligned.set_bank(align_table_linear(&grid, bank));
    }

    for (key, raw) in day.racks() {
        let summary = match raw.summary() {
            Some(table) => align_table_linear(&grid, table),
            None => SeriesSet::new(),
        };

        let mut rack = AlignedRack::new(summary);

        if let (Some(batvol), Some(battemp)) = (raw.batvol(), raw.battemp()) {
            let voltage_groups = channel_matrices(&grid, batvol, 'V', settings.cells_per_module(), true);
            let temp_groups = channel_matrices(&grid, battemp, 'T', settings.temp_per_module(), false);

            let modules = std::cmp::min(voltage_groups.len(), temp_groups.len());
            if voltage_groups.len() != temp_groups.len() {
                log::warn!("{} has {} voltage module groups but {} temperature groups - using {}",
                    key, voltage_groups.len(), temp_groups.len(), modules);
            }

            for (m, (voltage, temp)) in voltage_groups.into_iter().zip(temp_groups).enumerate() {
                rack.insert_module(m as u32 + 1, AlignedModule::new(voltage, temp));
            }
        }

        aligned.insert_rack(*key, rack);
    }

    aligned
}

///
/// The uniform grid covering [min, max] of every input time vector.
///
fn build_grid(day: &DayRaw, step: i64) -> TimeGrid {
    let mut t_min = None;
    let mut t_max = None;

    for times in day.time_vectors() {
        if let (Some(&first), Some(&last)) = (times.first(), times.last()) {
            t_min = Some(t_min.map_or(first, |current: i64| current.min(first)));
            t_max = Some(t_max.map_or(last, |current: i64| current.max(last)));
        }
    }

    match (t_min, t_max) {
        (Some(t_min), Some(t_max)) => TimeGrid::build(t_min, t_max, step),
        _ => TimeGrid::empty(step),
    }
}

fn align_table_linear(grid: &TimeGrid, table: &ColumnTable) -> SeriesSet {
    table.columns()
        .map(|(name, values)| (name.to_string(), align_linear(grid, table.times(), values)))
        .collect()
}

///
/// Align each channel column, order them by numeric suffix, and chunk into
/// fixed-size module groups. Surplus columns that do not fill a whole group are
/// discarded with a warning.
///
fn channel_matrices(grid: &TimeGrid, table: &ColumnTable, prefix: char, group_size: usize, linear: bool) -> Vec<Matrix> {
    let ordered: Vec<&str> = table.column_names()
        .filter_map(|name| channel_index(name, prefix).map(|index| (index, name)))
        .sorted_by_key(|(index, _)| *index)
        .map(|(_, name)| name)
        .collect();

    let surplus = ordered.len() % group_size;
    if surplus != 0 {
        log::warn!("Discarding {} surplus {}-channel column(s) that do not fill a module", surplus, prefix);
    }

    ordered.chunks_exact(group_size)
        .map(|group| {
            let columns: Vec<Vec<f64>> = group.iter()
                .map(|name| {
                    let values = table.column(name).expect("ordered column vanished");
                    match linear {
                        true  => align_linear(grid, table.times(), values),
                        false => align_ffill(grid, table.times(), values),
                    }
                })
                .collect();

            Matrix::from_columns(grid.len(), &columns)
        })
        .collect()
}

fn channel_index(name: &str, prefix: char) -> Option<u32> {
    let mut chars = name.chars();
    match chars.next()? == prefix {
        true  => chars.as_str().parse().ok(),
        false => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::router::{MemberKind, RackRef};
    use crate::model::dayraw::RackKey;

    fn settings(cells: usize, temps: usize) -> Settings {
        serde_yaml::from_str(&format!(
            "CELLS_PER_MODULE: {}\nTEMP_PER_MODULE: {}\nMODULE_ROWS: 1\nMODULE_COLS: {}\n",
            cells, temps, cells)).unwrap()
    }

    fn channel_table(prefix: char, channels: usize, times: &[i64], base: f64) -> ColumnTable {
        let names: Vec<String> = (1..=channels).map(|c| format!("{}{}", prefix, c)).collect();
        let mut table = ColumnTable::new(names);
        for &t in times {
            let row: Vec<f64> = (0..channels).map(|c| base + c as f64).collect();
            table.push_row(t, &row);
        }
        table.finish();
        table
    }

    #[test]
    fn grid_covers_the_union_of_all_series() {
        let mut day = DayRaw::default();
        day.merge(MemberKind::BatVol, RackRef::Rack(1), channel_table('V', 2, &[100, 200], 3.0));
        day.merge(MemberKind::BatTemp, RackRef::Rack(1), channel_table('T', 2, &[50, 150], 25.0));

        let aligned = align_day(&day, &settings(2, 2));
        assert_eq!(aligned.grid().start(), 50);
        assert_eq!(aligned.grid().end(), Some(200));
    }

    #[test]
    fn empty_day_aligns_to_an_empty_tree() {
        let aligned = align_day(&DayRaw::default(), &settings(2, 2));
        assert!(aligned.grid().is_empty());
        assert_eq!(aligned.racks().count(), 0);
        assert!(aligned.bank().is_none());
    }

    #[test]
    fn rack_missing_temperatures_gets_no_modules() {
        let mut day = DayRaw::default();
        day.merge(MemberKind::BatVol, RackRef::Rack(2), channel_table('V', 4, &[0, 5], 3.0));

        let aligned = align_day(&day, &settings(2, 2));
        let rack = aligned.rack(&RackKey::Rack(2)).unwrap();
        assert_eq!(rack.module_count(), 0);
    }

    #[test]
    fn channel_columns_partition_into_modules_by_suffix_order() {
        let mut day = DayRaw::default();
        day.merge(MemberKind::BatVol, RackRef::Rack(1), channel_table('V', 5, &[0, 10], 1.0));
        day.merge(MemberKind::BatTemp, RackRef::Rack(1), channel_table('T', 4, &[0, 10], 20.0));

        // 5 voltage columns / 2 per module = 2 modules (1 surplus discarded);
        // 4 temp columns / 2 per module = 2 modules.
        let aligned = align_day(&day, &settings(2, 2));
        let rack = aligned.rack(&RackKey::Rack(1)).unwrap();
        assert_eq!(rack.module_count(), 2);

        let module1 = rack.module(1).unwrap();
        assert_eq!(module1.voltage().cols(), 2);
        assert_eq!(module1.voltage().rows(), 3); // t = 0, 5, 10.
        assert_eq!(module1.voltage().get(0, 0), 1.0); // V1.
        assert_eq!(module1.voltage().get(0, 1), 2.0); // V2.

        let module2 = rack.module(2).unwrap();
        assert_eq!(module2.voltage().get(0, 0), 3.0); // V3.
    }

    #[test]
    fn module_count_is_the_smaller_of_the_two_partitions() {
        let mut day = DayRaw::default();
        day.merge(MemberKind::BatVol, RackRef::Rack(1), channel_table('V', 4, &[0, 5], 3.0));
        day.merge(MemberKind::BatTemp, RackRef::Rack(1), channel_table('T', 2, &[0, 5], 20.0));

        let aligned = align_day(&day, &settings(2, 2));
        assert_eq!(aligned.rack(&RackKey::Rack(1)).unwrap().module_count(), 1);
    }

    #[test]
    fn bank_subtree_appears_only_when_parsed() {
        let mut day = DayRaw::default();
        let mut bank = ColumnTable::new(vec!("totalVol"));
        bank.push_row(0, &[700.0]);
        bank.push_row(10, &[701.0]);
        bank.finish();
        day.merge(MemberKind::Summary, RackRef::Bank, bank);

        let aligned = align_day(&day, &settings(2, 2));
        let bank = aligned.bank().unwrap();
        assert_eq!(bank["totalVol"], vec!(700.0, 700.5, 701.0));
    }

    #[test]
    fn suffix_order_is_numeric_not_lexicographic() {
        let mut table = ColumnTable::new(vec!("V10", "V2", "V1"));
        table.push_row(0, &[10.0, 2.0, 1.0]);
        table.push_row(5, &[10.0, 2.0, 1.0]);
        table.finish();

        let grid = TimeGrid::build(0, 5, 5);
        let matrices = channel_matrices(&grid, &table, 'V', 3, true);
        assert_eq!(matrices.len(), 1);
        assert_eq!(matrices[0].row(0), &[1.0, 2.0, 10.0]);
    }
}
