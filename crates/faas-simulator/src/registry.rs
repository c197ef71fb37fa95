use faas_common::{Container, ContainerId, ContainerState, SimTime};

const FIRST_ID: u64 = 1;

/// Owns every simulated container, in creation order.
///
/// Ids restart at `lambda-1` after [`ContainerRegistry::clear`], so each
/// clear also bumps the generation. Work scheduled against an older
/// generation must not touch the containers of the current one.
#[derive(Debug)]
pub struct ContainerRegistry {
    containers: Vec<Container>,
    next_id: u64,
    generation: u64,
}

impl Default for ContainerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ContainerRegistry {
    pub fn new() -> Self {
        Self {
            containers: Vec::new(),
            next_id: FIRST_ID,
            generation: 0,
        }
    }

    pub fn create(&mut self, now: SimTime) -> Container {
        let container = Container {
            id: ContainerId::new(self.next_id),
            state: ContainerState::Cold,
            created_at: now,
            last_used_at: now,
            execution_count: 0,
        };
        self.next_id += 1;
        self.containers.push(container.clone());
        container
    }

    /// Earliest-created container that is warm or idle.
    pub fn find_reusable(&self) -> Option<ContainerId> {
        self.containers
            .iter()
            .find(|c| c.state.is_reusable())
            .map(|c| c.id)
    }

    pub fn get(&self, id: ContainerId) -> Option<&Container> {
        let index = Self::index_of(id)?;
        self.containers.get(index).filter(|c| c.id == id)
    }

    pub fn get_mut(&mut self, id: ContainerId) -> Option<&mut Container> {
        let index = Self::index_of(id)?;
        self.containers.get_mut(index).filter(|c| c.id == id)
    }

    /// Like [`ContainerRegistry::get_mut`], but only if `generation` is still current.
    pub fn get_mut_in(&mut self, generation: u64, id: ContainerId) -> Option<&mut Container> {
        if generation != self.generation {
            return None;
        }
        self.get_mut(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Container> {
        self.containers.iter()
    }

    pub fn all(&self) -> Vec<Container> {
        self.containers.clone()
    }

    /// Drop every container and restart the id sequence. Returns how many were dropped.
    pub fn clear(&mut self) -> usize {
        let dropped = self.containers.len();
        self.containers.clear();
        self.next_id = FIRST_ID;
        self.generation += 1;
        dropped
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn len(&self) -> usize {
        self.containers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.containers.is_empty()
    }

    fn index_of(id: ContainerId) -> Option<usize> {
        id.get()
            .checked_sub(FIRST_ID)
            .and_then(|i| usize::try_from(i).ok())
    }
}
