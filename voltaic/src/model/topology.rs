use serde::Serialize;
use std::collections::HashMap;
use core_lib::config::Settings;

///
/// The physical hierarchy of the battery system: a stack owns racks, a rack owns
/// modules, a module owns a fixed grid of cells plus a fixed run of temperature
/// sensors. Global cell/sensor ids are 1-based and contiguous within a rack, in
/// the same order as the V1../T1.. CSV columns.
///
#[derive(Clone, Debug, Serialize)]
pub struct Stack {
    stack_id: u32,
    racks: Vec<Rack>,
}

#[derive(Clone, Debug, Serialize)]
pub struct Rack {
    rack_id: u32,
    modules: Vec<Module>,
}

#[derive(Clone, Debug, Serialize)]
pub struct Module {
    module_id: u32,
    n_rows: usize,
    n_cols: usize,
    cells: Vec<Cell>,
    temps: Vec<TemperatureSensor>,
}

#[derive(Clone, Copy, Debug, Serialize)]
pub struct Cell {
    cell_id: u32,   // Global index inside the rack.
    module_id: u32,
    row: u32,
    col: u32,
}

#[derive(Clone, Copy, Debug, Serialize)]
pub struct TemperatureSensor {
    temp_id: u32,   // Global index inside the rack.
    module_id: u32,
    pos: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct CellPosition {
    pub rack: u32,
    pub module: u32,
    pub row: u32,
    pub col: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct TempPosition {
    pub rack: u32,
    pub module: u32,
    pub pos: u32,
}

///
/// The built hierarchy plus bidirectional id/position lookups. Built once per job
/// from settings and shared read-only by the analyzers and the result store.
///
#[derive(Clone, Debug)]
pub struct Topology {
    stack: Stack,
    cells: HashMap<(u32, u32), CellPosition>, // (rack_id, cell_id) -> position
    temps: HashMap<(u32, u32), TempPosition>, // (rack_id, temp_id) -> position
}

impl Rack {
    pub fn rack_id(&self) -> u32 {
        self.rack_id
    }

    pub fn modules(&self) -> &[Module] {
        &self.modules
    }

    pub fn n_cells_total(&self) -> usize {
        self.modules.iter().map(|module| module.cells.len()).sum()
    }

    pub fn n_temps_total(&self) -> usize {
        self.modules.iter().map(|module| module.temps.len()).sum()
    }
}

impl Module {
    pub fn module_id(&self) -> u32 {
        self.module_id
    }

    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    pub fn temps(&self) -> &[TemperatureSensor] {
        &self.temps
    }
}

impl Topology {
    ///
    /// Deterministic id assignment: walk racks, then modules, handing out cell ids
    /// row-major within each module and sensor ids in position order. The counters
    /// restart for every rack.
    ///
    pub fn build(settings: &Settings) -> Self {
        let mut racks = Vec::with_capacity(settings.n_racks());
        let mut cells = HashMap::new();
        let mut temps = HashMap::new();

        for r in 0..settings.n_racks() as u32 {
            let rack_id = r + 1;
            let mut modules = Vec::with_capacity(settings.n_modules_per_rack());
            let mut next_cell_id = 1;
            let mut next_temp_id = 1;

            for m in 0..settings.n_modules_per_rack() as u32 {
                let module_id = m + 1;
                let mut module_cells = Vec::with_capacity(settings.cells_per_module());
                let mut module_temps = Vec::with_capacity(settings.temp_per_module());

                for row in 0..settings.module_rows() as u32 {
                    for col in 0..settings.module_cols() as u32 {
                        module_cells.push(Cell { cell_id: next_cell_id, module_id, row, col });
                        cells.insert((rack_id, next_cell_id), CellPosition { rack: rack_id, module: module_id, row, col });
                        next_cell_id += 1;
                    }
                }

                for pos in 0..settings.temp_per_module() as u32 {
                    module_temps.push(TemperatureSensor { temp_id: next_temp_id, module_id, pos });
                    temps.insert((rack_id, next_temp_id), TempPosition { rack: rack_id, module: module_id, pos });
                    next_temp_id += 1;
                }

                modules.push(Module {
                    module_id,
                    n_rows: settings.module_rows(),
                    n_cols: settings.module_cols(),
                    cells: module_cells,
                    temps: module_temps,
                });
            }

            racks.push(Rack { rack_id, modules });
        }

        Self { stack: Stack { stack_id: 1, racks }, cells, temps }
    }

    pub fn racks(&self) -> &[Rack] {
        &self.stack.racks
    }

    pub fn stack(&self) -> &Stack {
        &self.stack
    }

    pub fn cell_position(&self, rack_id: u32, cell_id: u32) -> Option<CellPosition> {
        self.cells.get(&(rack_id, cell_id)).copied()
    }

    pub fn temp_position(&self, rack_id: u32, temp_id: u32) -> Option<TempPosition> {
        self.temps.get(&(rack_id, temp_id)).copied()
    }

    ///
    /// Global cell ids belonging to one module - the result store uses these to label
    /// matrix channels when expanding back to long form. None when the rack or module
    /// is outside the configured topology.
    ///
    pub fn module_cell_ids(&self, rack_id: u32, module_id: u32) -> Option<Vec<u32>> {
        self.module(rack_id, module_id)
            .map(|module| module.cells.iter().map(|cell| cell.cell_id).collect())
    }

    pub fn module_temp_ids(&self, rack_id: u32, module_id: u32) -> Option<Vec<u32>> {
        self.module(rack_id, module_id)
            .map(|module| module.temps.iter().map(|temp| temp.temp_id).collect())
    }

    fn module(&self, rack_id: u32, module_id: u32) -> Option<&Module> {
        self.stack.racks.iter()
            .find(|rack| rack.rack_id == rack_id)
            .and_then(|rack| rack.modules.iter().find(|module| module.module_id == module_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> Settings {
        Settings::default() // 2 racks, 7 modules, 4x8 cells, 20 sensors.
    }

    #[test]
    fn ids_are_contiguous_within_a_rack() {
        let topology = Topology::build(&settings());

        let rack = &topology.racks()[0];
        assert_eq!(rack.n_cells_total(), 7 * 32);
        assert_eq!(rack.n_temps_total(), 7 * 20);

        // Module 2's first cell follows module 1's last.
        assert_eq!(topology.module_cell_ids(1, 1).unwrap().last(), Some(&32));
        assert_eq!(topology.module_cell_ids(1, 2).unwrap().first(), Some(&33));
    }

    #[test]
    fn counters_restart_per_rack() {
        let topology = Topology::build(&settings());
        assert_eq!(topology.module_cell_ids(2, 1).unwrap().first(), Some(&1));
    }

    #[test]
    fn lookups_are_bidirectional_with_the_tree() {
        let topology = Topology::build(&settings());

        let position = topology.cell_position(1, 33).unwrap();
        assert_eq!(position, CellPosition { rack: 1, module: 2, row: 0, col: 0 });

        let position = topology.cell_position(1, 40).unwrap();
        assert_eq!(position.row, 0);
        assert_eq!(position.col, 7);

        let temp = topology.temp_position(2, 21).unwrap();
        assert_eq!(temp, TempPosition { rack: 2, module: 2, pos: 0 });
    }

    #[test]
    fn out_of_range_lookups_are_none() {
        let topology = Topology::build(&settings());
        assert_eq!(topology.cell_position(3, 1), None);
        assert_eq!(topology.module_cell_ids(1, 99), None);
    }
}
