use std::fmt;
use std::collections::BTreeMap;
use crate::ingest::router::{MemberKind, RackRef};
use crate::model::table::ColumnTable;

///
/// Identity of a rack within one job's data. Members whose name carries no readable
/// rack number are grouped together under `Unknown` and still flow through alignment.
///
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RackKey {
    Rack(u32),
    Unknown,
}

impl fmt::Display for RackKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RackKey::Rack(id) => write!(f, "rack{}", id),
            RackKey::Unknown  => write!(f, "rack_unknown"),
        }
    }
}

///
/// The loose per-job aggregate of everything parsed out of the input archives,
/// grouped by (bank | rack, member kind). Built during INGEST, consumed by ALIGN.
///
#[derive(Debug, Default)]
pub struct DayRaw {
    bank_summary: Option<ColumnTable>,
    racks: BTreeMap<RackKey, RackRaw>,
}

#[derive(Debug, Default)]
pub struct RackRaw {
    summary: Option<ColumnTable>,
    batvol: Option<ColumnTable>,
    battemp: Option<ColumnTable>,
}

impl RackRaw {
    pub fn summary(&self) -> Option<&ColumnTable> {
        self.summary.as_ref()
    }

    pub fn batvol(&self) -> Option<&ColumnTable> {
        self.batvol.as_ref()
    }

    pub fn battemp(&self) -> Option<&ColumnTable> {
        self.battemp.as_ref()
    }
}

impl DayRaw {
    pub fn bank_summary(&self) -> Option<&ColumnTable> {
        self.bank_summary.as_ref()
    }

    pub fn racks(&self) -> impl Iterator<Item = (&RackKey, &RackRaw)> {
        self.racks.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.bank_summary.is_none() && self.racks.is_empty()
    }

    ///
    /// Merge one parsed member into the aggregate.
    ///
    /// Bank summary is last-writer-wins (a second bank summary in one job is
    /// unexpected but tolerated). Rack slots row-concatenate so a job spanning
    /// several archives accumulates the full day.
    ///
    pub fn merge(&mut self, kind: MemberKind, rack: RackRef, table: ColumnTable) {
        match (kind, rack) {
            (MemberKind::Summary, RackRef::Bank) => {
                if self.bank_summary.is_some() {
                    log::warn!("Multiple bank summary members in one job - keeping the most recent");
                }
                self.bank_summary = Some(table);
            },
            (MemberKind::Summary, rack) => merge_slot(&mut self.rack_mut(rack).summary, table),
            (MemberKind::BatVol, rack)  => merge_slot(&mut self.rack_mut(rack).batvol, table),
            (MemberKind::BatTemp, rack) => merge_slot(&mut self.rack_mut(rack).battemp, table),
        }
    }

    ///
    /// Every time vector in the aggregate - the aligner derives the grid span from these.
    ///
    pub fn time_vectors(&self) -> Vec<&[i64]> {
        let mut vectors = Vec::new();

        if let Some(bank) = &self.bank_summary {
            vectors.push(bank.times());
        }

        for rack in self.racks.values() {
            for table in [&rack.summary, &rack.batvol, &rack.battemp].into_iter().flatten() {
                vectors.push(table.times());
            }
        }

        vectors
    }

    fn rack_mut(&mut self, rack: RackRef) -> &mut RackRaw {
        let key = match rack {
            RackRef::Rack(id) => RackKey::Rack(id),
            _ => RackKey::Unknown, // A bank-flagged voltage/temperature member has no rack home.
        };
        self.racks.entry(key).or_default()
    }
}

fn merge_slot(slot: &mut Option<ColumnTable>, table: ColumnTable) {
    match slot {
        Some(existing) => existing.append(table),
        None => *slot = Some(table),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(times: &[i64]) -> ColumnTable {
        let mut table = ColumnTable::new(vec!("V1"));
        for &t in times {
            table.push_row(t, &[1.0]);
        }
        table.finish();
        table
    }

    #[test]
    fn bank_summary_is_last_writer_wins() {
        let mut day = DayRaw::default();
        day.merge(MemberKind::Summary, RackRef::Bank, table(&[100]));
        day.merge(MemberKind::Summary, RackRef::Bank, table(&[200, 205]));

        assert_eq!(day.bank_summary().unwrap().times(), &[200, 205]);
    }

    #[test]
    fn rack_members_accumulate() {
        let mut day = DayRaw::default();
        day.merge(MemberKind::BatVol, RackRef::Rack(1), table(&[100]));
        day.merge(MemberKind::BatVol, RackRef::Rack(1), table(&[105]));
        day.merge(MemberKind::BatTemp, RackRef::Rack(2), table(&[100]));

        let rack1 = &day.racks[&RackKey::Rack(1)];
        assert_eq!(rack1.batvol().unwrap().times(), &[100, 105]);
        assert!(day.racks[&RackKey::Rack(2)].battemp().is_some());
    }

    #[test]
    fn unreadable_rack_ids_group_under_unknown() {
        let mut day = DayRaw::default();
        day.merge(MemberKind::BatVol, RackRef::Unknown, table(&[100]));
        day.merge(MemberKind::BatVol, RackRef::Unknown, table(&[105]));

        assert_eq!(day.racks.len(), 1);
        assert_eq!(day.racks[&RackKey::Unknown].batvol().unwrap().len(), 2);
    }

    #[test]
    fn time_vectors_cover_every_slot() {
        let mut day = DayRaw::default();
        day.merge(MemberKind::Summary, RackRef::Bank, table(&[50]));
        day.merge(MemberKind::BatVol, RackRef::Rack(1), table(&[100]));
        day.merge(MemberKind::BatTemp, RackRef::Rack(1), table(&[150]));

        assert_eq!(day.time_vectors().len(), 3);
    }
}
