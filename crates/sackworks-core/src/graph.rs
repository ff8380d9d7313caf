//! Spatial routing between placed components.
//!
//! Components occupy one cell each. An output side `D` of a component
//! connects to the neighbor in direction `D` when that neighbor accepts balls
//! entering from `reverse(D)`. Connections are resolved once, strictly,
//! before the first tick; removing a component later leaves dangling ports on
//! its neighbors.

use std::collections::HashMap;

use slotmap::{SecondaryMap, SlotMap};

use crate::error::ConfigError;
use crate::geometry::{Direction, GridPosition, GridSize};
use crate::id::ComponentId;
use crate::registry::ComponentKind;

// ---------------------------------------------------------------------------
// Core data structures
// ---------------------------------------------------------------------------

/// Per-component data stored in the routing graph.
#[derive(Debug, Clone, PartialEq)]
pub struct ComponentNode {
    pub name: String,
    pub kind: ComponentKind,
    pub position: GridPosition,
    pub plex_glass: bool,
}

/// A resolved link from one component's output to a neighbor's input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Connection {
    pub from: ComponentId,
    pub to: ComponentId,
    /// Side of `from` the ball leaves through.
    pub exit: Direction,
    /// Side of `to` the ball enters through.
    pub entry: Direction,
}

/// State of one output side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Port {
    Connected(Connection),
    /// The neighbor was removed after resolution.
    Dangling,
}

// ---------------------------------------------------------------------------
// RoutingGraph
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct RoutingGraph {
    grid: GridSize,
    nodes: SlotMap<ComponentId, ComponentNode>,
    /// Placement order; components are polled in this order.
    order: Vec<ComponentId>,
    cells: HashMap<GridPosition, ComponentId>,
    names: HashMap<String, ComponentId>,
    ports: SecondaryMap<ComponentId, Vec<(Direction, Port)>>,
}

impl RoutingGraph {
    pub fn new(grid: GridSize) -> Self {
        Self {
            grid,
            nodes: SlotMap::with_key(),
            order: Vec::new(),
            cells: HashMap::new(),
            names: HashMap::new(),
            ports: SecondaryMap::new(),
        }
    }

    pub fn grid(&self) -> GridSize {
        self.grid
    }

    /// Place a component. Fails on duplicate names, cells outside the grid
    /// and occupied cells.
    pub fn place(&mut self, node: ComponentNode) -> Result<ComponentId, ConfigError> {
        if self.names.contains_key(&node.name) {
            return Err(ConfigError::DuplicateComponent(node.name));
        }
        if !self.grid.contains(node.position) {
            return Err(ConfigError::OutOfGrid {
                component: node.name,
                position: node.position,
            });
        }
        if self.cells.contains_key(&node.position) {
            return Err(ConfigError::Occupied {
                component: node.name,
                position: node.position,
            });
        }
        let position = node.position;
        let name = node.name.clone();
        let id = self.nodes.insert(node);
        self.order.push(id);
        self.cells.insert(position, id);
        self.names.insert(name, id);
        Ok(id)
    }

    /// Resolve every declared output of every component.
    ///
    /// `outputs` lists a component's output sides; `accepts` answers whether
    /// a component takes balls entering through a side.
    pub fn resolve<O, A>(&mut self, outputs: O, accepts: A) -> Result<(), ConfigError>
    where
        O: Fn(ComponentId) -> Vec<Direction>,
        A: Fn(ComponentId, Direction) -> bool,
    {
        self.ports.clear();
        for &id in &self.order {
            let node = &self.nodes[id];
            let mut ports = Vec::new();
            for exit in outputs(id) {
                let entry = exit.opposite();
                let target = self
                    .cells
                    .get(&node.position.step(exit))
                    .copied()
                    .filter(|&to| accepts(to, entry))
                    .ok_or_else(|| ConfigError::UnresolvedPort {
                        component: node.name.clone(),
                        side: exit,
                    })?;
                log::debug!(
                    "routing {}:{exit} -> {}:{entry}",
                    node.name,
                    self.nodes[target].name
                );
                ports.push((
                    exit,
                    Port::Connected(Connection {
                        from: id,
                        to: target,
                        exit,
                        entry,
                    }),
                ));
            }
            self.ports.insert(id, ports);
        }
        Ok(())
    }

    /// Where a ball leaving `from` through `side` goes. `None` when `side`
    /// is not one of its resolved outputs.
    pub fn route(&self, from: ComponentId, side: Direction) -> Option<Port> {
        self.ports
            .get(from)?
            .iter()
            .find(|(s, _)| *s == side)
            .map(|(_, port)| *port)
    }

    /// Remove a component, leaving its neighbors' ports into it dangling.
    pub fn remove(&mut self, id: ComponentId) -> Option<ComponentNode> {
        let node = self.nodes.remove(id)?;
        self.order.retain(|&c| c != id);
        self.cells.remove(&node.position);
        self.names.remove(&node.name);
        self.ports.remove(id);
        for (_, ports) in self.ports.iter_mut() {
            for (_, port) in ports.iter_mut() {
                if matches!(port, Port::Connected(c) if c.to == id) {
                    *port = Port::Dangling;
                }
            }
        }
        Some(node)
    }

    pub fn node(&self, id: ComponentId) -> Option<&ComponentNode> {
        self.nodes.get(id)
    }

    pub fn id_of(&self, name: &str) -> Option<ComponentId> {
        self.names.get(name).copied()
    }

    pub fn component_at(&self, position: GridPosition) -> Option<ComponentId> {
        self.cells.get(&position).copied()
    }

    pub fn order(&self) -> &[ComponentId] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Every live connection, in placement order of the source.
    pub fn connections(&self) -> Vec<Connection> {
        self.order
            .iter()
            .filter_map(|&id| self.ports.get(id))
            .flatten()
            .filter_map(|(_, port)| match port {
                Port::Connected(c) => Some(*c),
                Port::Dangling => None,
            })
            .collect()
    }

    /// Connections feeding into `id`.
    pub fn inputs_of(&self, id: ComponentId) -> Vec<Connection> {
        self.connections()
            .into_iter()
            .filter(|c| c.to == id)
            .collect()
    }
}
