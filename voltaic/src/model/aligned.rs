use std::collections::BTreeMap;
use crate::model::dayraw::RackKey;
use crate::model::grid::TimeGrid;
use crate::model::matrix::Matrix;

/// Named series already re-sampled onto the job's grid, in stable name order.
pub type SeriesSet = BTreeMap<String, Vec<f64>>;

///
/// The aligned tree for one job: a single grid, the optional bank summary, and a
/// rack subtree per rack seen during ingest. Everything inside is on grid time.
///
#[derive(Debug)]
pub struct Aligned {
    grid: TimeGrid,
    bank: Option<SeriesSet>,
    racks: BTreeMap<RackKey, AlignedRack>,
}

#[derive(Debug, Default)]
pub struct AlignedRack {
    summary: SeriesSet,
    modules: BTreeMap<u32, AlignedModule>,
}

#[derive(Debug)]
pub struct AlignedModule {
    voltage: Matrix,
    temp: Matrix,
}

impl Aligned {
    pub fn new(grid: TimeGrid) -> Self {
        Self { grid, bank: None, racks: BTreeMap::new() }
    }

    pub fn empty(step: i64) -> Self {
        Self::new(TimeGrid::empty(step))
    }

    pub fn grid(&self) -> &TimeGrid {
        &self.grid
    }

    pub fn bank(&self) -> Option<&SeriesSet> {
        self.bank.as_ref()
    }

    pub fn set_bank(&mut self, bank: SeriesSet) {
        self.bank = Some(bank);
    }

    pub fn racks(&self) -> impl Iterator<Item = (&RackKey, &AlignedRack)> {
        self.racks.iter()
    }

    pub fn rack(&self, key: &RackKey) -> Option<&AlignedRack> {
        self.racks.get(key)
    }

    pub fn insert_rack(&mut self, key: RackKey, rack: AlignedRack) {
        self.racks.insert(key, rack);
    }
}

impl AlignedRack {
    pub fn new(summary: SeriesSet) -> Self {
        Self { summary, modules: BTreeMap::new() }
    }

    pub fn summary(&self) -> &SeriesSet {
        &self.summary
    }

    pub fn modules(&self) -> impl Iterator<Item = (&u32, &AlignedModule)> {
        self.modules.iter()
    }

    pub fn module_count(&self) -> usize {
        self.modules.len()
    }

    pub fn module(&self, module_id: u32) -> Option<&AlignedModule> {
        self.modules.get(&module_id)
    }

    pub fn insert_module(&mut self, module_id: u32, module: AlignedModule) {
        self.modules.insert(module_id, module);
    }
}

impl AlignedModule {
    pub fn new(voltage: Matrix, temp: Matrix) -> Self {
        Self { voltage, temp }
    }

    pub fn voltage(&self) -> &Matrix {
        &self.voltage
    }

    pub fn temp(&self) -> &Matrix {
        &self.temp
    }
}
