//! Double-buffered device storage for the mutation pass
//!
//! Two identical sets of six arrays. One set is read, the other written;
//! `swap` flips the roles by index without copying anything.

use super::data::{ARRAY_COUNT, ARRAY_NAMES, ELEMENT_SIZES};
use crate::error::{RenderError, RenderResult};
use crate::gpu::{BufferUsage, NativeHandle};
use crate::memory::ResourceManager;

#[derive(Debug, Clone)]
pub struct MutationBufferSet {
    ids: [String; ARRAY_COUNT],
}

impl MutationBufferSet {
    fn new(set: usize) -> Self {
        Self {
            ids: ARRAY_NAMES.map(|name| format!("mutation/{}/{}", set, name)),
        }
    }

    pub fn ids(&self) -> &[String; ARRAY_COUNT] {
        &self.ids
    }

    /// Current native handles, `None` if any buffer is gone
    pub fn handles(&self, resources: &ResourceManager) -> Option<[NativeHandle; ARRAY_COUNT]> {
        let mut handles = [NativeHandle(0); ARRAY_COUNT];
        for (slot, id) in handles.iter_mut().zip(&self.ids) {
            *slot = resources.handle(id)?;
        }
        Some(handles)
    }
}

#[derive(Debug)]
pub struct MutationBufferPair {
    sets: [MutationBufferSet; 2],
    current_input: usize,
    capacity: usize,
}

impl MutationBufferPair {
    /// Allocate both sets zero-filled at `capacity` organisms and retain them
    pub fn create(resources: &mut ResourceManager, capacity: usize) -> RenderResult<Self> {
        let pair = Self {
            sets: [MutationBufferSet::new(0), MutationBufferSet::new(1)],
            current_input: 0,
            capacity,
        };

        let mut created: Vec<&String> = Vec::with_capacity(ARRAY_COUNT * 2);
        for set in &pair.sets {
            for (id, size) in set.ids.iter().zip(ELEMENT_SIZES) {
                let zeros = vec![0u8; capacity * size];
                if resources.create_buffer(id, &zeros, BufferUsage::Storage).is_none() {
                    for done in created {
                        resources.release_now(done);
                    }
                    return Err(RenderError::init_failure(
                        "MutationBufferPair",
                        format!("could not allocate '{}' ({} bytes)", id, zeros.len()),
                    ));
                }
                resources.retain_resource(id);
                created.push(id);
            }
        }

        log::debug!(
            "[MutationBufferPair::create] {} buffers for {} organisms",
            ARRAY_COUNT * 2,
            capacity
        );
        Ok(pair)
    }

    pub fn input(&self) -> &MutationBufferSet {
        &self.sets[self.current_input]
    }

    pub fn output(&self) -> &MutationBufferSet {
        &self.sets[1 - self.current_input]
    }

    pub fn current_input(&self) -> usize {
        self.current_input
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn swap(&mut self) {
        self.current_input = 1 - self.current_input;
    }

    pub fn touch(&self, resources: &mut ResourceManager) {
        for id in self.sets.iter().flat_map(|set| set.ids.iter()) {
            resources.touch(id);
        }
    }

    pub fn release(&self, resources: &mut ResourceManager) {
        for id in self.sets.iter().flat_map(|set| set.ids.iter()) {
            resources.release_now(id);
        }
    }
}
