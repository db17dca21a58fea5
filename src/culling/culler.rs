use glam::Vec3;
use rustc_hash::FxHashMap;
use serde::Serialize;

use super::frustum::{BoundingVolume, Frustum};
use crate::camera::Camera;
use crate::config::CullingConfig;
use crate::constants::culling::{ADAPTIVE_GROWTH, ADAPTIVE_TOLERANCE, DEFAULT_DEPTH_RANGE};

#[derive(Debug, Clone, PartialEq)]
pub struct CullableObject {
    pub id: String,
    pub bounds: BoundingVolume,
    /// Higher sorts first
    pub priority: i32,
    /// Clock value (ms) of the last pass that kept this object
    pub last_visible: f64,
    /// Distance to the camera, cached by the last pass that kept it
    pub distance: f32,
    /// World units per second, for predictive culling
    pub velocity: Option<Vec3>,
}

impl CullableObject {
    pub fn new(id: impl Into<String>, bounds: BoundingVolume, priority: i32) -> Self {
        Self {
            id: id.into(),
            bounds,
            priority,
            last_visible: 0.0,
            distance: 0.0,
            velocity: None,
        }
    }

    pub fn with_velocity(mut self, velocity: Vec3) -> Self {
        self.velocity = Some(velocity);
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CullingStats {
    pub tested: usize,
    pub visible: usize,
    pub culled_by_frustum: usize,
    pub culled_by_cap: usize,
    pub culled_by_occlusion: usize,
    /// Spatial-grid cells rejected without testing their members
    pub cells_rejected: usize,
    /// Share of tested objects that were culled
    pub efficiency: f32,
}

/// Visible objects split by distance; the last bucket holds everything past
/// the final threshold
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LodBuckets {
    pub levels: Vec<Vec<CullableObject>>,
}

impl LodBuckets {
    pub fn level(&self, index: usize) -> &[CullableObject] {
        self.levels.get(index).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn total(&self) -> usize {
        self.levels.iter().map(Vec::len).sum()
    }
}

/// Bucket objects by their cached distance
pub fn bucket_by_lod(objects: &[CullableObject], lod_levels: &[f32]) -> LodBuckets {
    let mut levels = vec![Vec::new(); lod_levels.len() + 1];
    for object in objects {
        let index = lod_levels
            .iter()
            .position(|&threshold| object.distance < threshold)
            .unwrap_or(lod_levels.len());
        levels[index].push(object.clone());
    }
    LodBuckets { levels }
}

pub struct FrustumCuller {
    camera: Camera,
    frustum: Frustum,
    depth_range: f32,

    max_visible_objects: usize,
    max_visible_ceiling: usize,
    min_visible_objects: usize,

    stats: CullingStats,
}

impl FrustumCuller {
    pub fn new(config: &CullingConfig, max_visible_objects: usize) -> Self {
        let camera = Camera::default();
        let depth_range = if config.depth_range > 0.0 {
            config.depth_range
        } else {
            DEFAULT_DEPTH_RANGE
        };
        let frustum = Frustum::from_camera(&camera, depth_range).unwrap_or_else(Frustum::accept_all);
        Self {
            camera,
            frustum,
            depth_range,
            max_visible_objects,
            max_visible_ceiling: max_visible_objects,
            min_visible_objects: config.min_visible_objects.min(max_visible_objects),
            stats: CullingStats::default(),
        }
    }

    /// Recompute the planes. A camera without visible area is ignored and
    /// the previous frustum stays in effect.
    pub fn update_camera(&mut self, camera: Camera) -> bool {
        match Frustum::from_camera(&camera, self.depth_range) {
            Some(frustum) => {
                self.camera = camera;
                self.frustum = frustum;
                true
            }
            None => {
                log::warn!(
                    "[FrustumCuller::update_camera] Ignoring camera with viewport {}x{} zoom {}",
                    camera.viewport_width,
                    camera.viewport_height,
                    camera.zoom
                );
                false
            }
        }
    }

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    pub fn frustum(&self) -> &Frustum {
        &self.frustum
    }

    pub fn max_visible_objects(&self) -> usize {
        self.max_visible_objects
    }

    pub fn stats(&self) -> &CullingStats {
        &self.stats
    }

    pub fn is_box_in_frustum(&self, min: Vec3, max: Vec3) -> bool {
        self.frustum.intersects_box(min, max)
    }

    pub fn is_sphere_in_frustum(&self, center: Vec3, radius: f32) -> bool {
        self.frustum.intersects_sphere(center, radius)
    }

    /// Visible subset sorted by priority then distance, capped at the budget
    pub fn cull_objects(&mut self, objects: &mut [CullableObject], now: f64) -> Vec<CullableObject> {
        let frustum = self.frustum;
        let candidates: Vec<usize> = (0..objects.len())
            .filter(|&i| frustum.intersects(&objects[i].bounds))
            .collect();
        self.finish(objects, candidates, now, 0)
    }

    pub fn cull_by_lod(&mut self, objects: &mut [CullableObject], lod_levels: &[f32], now: f64) -> LodBuckets {
        let visible = self.cull_objects(objects, now);
        bucket_by_lod(&visible, lod_levels)
    }

    /// Drop objects hidden in the view plane behind a nearer occluder
    pub fn cull_by_occlusion(&mut self, objects: &[CullableObject], occluders: &[BoundingVolume]) -> Vec<CullableObject> {
        let camera_z = self.camera.position.z;
        let kept: Vec<CullableObject> = objects
            .iter()
            .filter(|object| {
                let (min, max) = object.bounds.xy_bounds();
                let depth = camera_z - object.bounds.center().z;
                !occluders.iter().any(|occluder| {
                    let (occ_min, occ_max) = occluder.xy_bounds();
                    let occluder_depth = camera_z - occluder.center().z;
                    occluder_depth < depth
                        && occ_min.cmple(min).all()
                        && occ_max.cmpge(max).all()
                })
            })
            .cloned()
            .collect();

        let removed = objects.len() - kept.len();
        self.stats.culled_by_occlusion += removed;
        self.stats.visible = self.stats.visible.saturating_sub(removed);
        self.refresh_efficiency();
        kept
    }

    /// Move the budget toward what the frame rate allows, then cull
    pub fn adaptive_cull(
        &mut self,
        objects: &mut [CullableObject],
        current_fps: f32,
        target_fps: f32,
        now: f64,
    ) -> Vec<CullableObject> {
        self.adjust_budget(current_fps, target_fps);
        self.cull_objects(objects, now)
    }

    /// Returns the new budget
    pub fn adjust_budget(&mut self, current_fps: f32, target_fps: f32) -> usize {
        if target_fps <= 0.0 || !current_fps.is_finite() {
            return self.max_visible_objects;
        }
        let ratio = (current_fps / target_fps).max(0.0);
        let current = self.max_visible_objects;

        let next = if ratio < 1.0 - ADAPTIVE_TOLERANCE {
            ((current as f32 * ratio) as usize).max(self.min_visible_objects)
        } else if ratio > 1.0 + ADAPTIVE_TOLERANCE {
            let step = ((current as f32 * ADAPTIVE_GROWTH) as usize).max(1);
            (current + step).min(self.max_visible_ceiling)
        } else {
            current
        };

        if next != current {
            log::debug!(
                "[FrustumCuller::adjust_budget] {:.1}/{:.1} fps, budget {} -> {}",
                current_fps,
                target_fps,
                current,
                next
            );
        }
        self.max_visible_objects = next;
        next
    }

    /// Test the union of each object's current and extrapolated volume
    pub fn predictive_cull(&mut self, objects: &mut [CullableObject], delta_time: f32, now: f64) -> Vec<CullableObject> {
        let frustum = self.frustum;
        let candidates: Vec<usize> = (0..objects.len())
            .filter(|&i| {
                let object = &objects[i];
                let volume = match object.velocity {
                    Some(velocity) => object.bounds.swept(velocity * delta_time),
                    None => object.bounds,
                };
                frustum.intersects(&volume)
            })
            .collect();
        self.finish(objects, candidates, now, 0)
    }

    /// Reject whole grid cells before testing their members
    pub fn spatial_cull(&mut self, objects: &mut [CullableObject], grid_size: f32, now: f64) -> Vec<CullableObject> {
        if grid_size <= 0.0 || !grid_size.is_finite() {
            return self.cull_objects(objects, now);
        }

        let mut cells: FxHashMap<(i32, i32), (Vec3, Vec3, Vec<usize>)> = FxHashMap::default();
        for (index, object) in objects.iter().enumerate() {
            let center = object.bounds.center();
            let key = ((center.x / grid_size).floor() as i32, (center.y / grid_size).floor() as i32);
            let (min, max) = object.bounds.min_max();
            let cell = cells.entry(key).or_insert((min, max, Vec::new()));
            cell.0 = cell.0.min(min);
            cell.1 = cell.1.max(max);
            cell.2.push(index);
        }

        let frustum = self.frustum;
        let mut cells_rejected = 0;
        let mut candidates = Vec::new();
        for (min, max, members) in cells.into_values() {
            if !frustum.intersects_box(min, max) {
                cells_rejected += 1;
                continue;
            }
            candidates.extend(members.into_iter().filter(|&i| frustum.intersects(&objects[i].bounds)));
        }
        // Cell iteration order is arbitrary; keep input order for stable sorting
        candidates.sort_unstable();
        self.finish(objects, candidates, now, cells_rejected)
    }

    fn finish(
        &mut self,
        objects: &mut [CullableObject],
        mut candidates: Vec<usize>,
        now: f64,
        cells_rejected: usize,
    ) -> Vec<CullableObject> {
        let position = self.camera.position;
        let distances: Vec<f32> = objects
            .iter()
            .map(|object| position.distance(object.bounds.center()))
            .collect();

        candidates.sort_by(|&a, &b| {
            objects[b]
                .priority
                .cmp(&objects[a].priority)
                .then(distances[a].total_cmp(&distances[b]))
        });

        let passed_frustum = candidates.len();
        candidates.truncate(self.max_visible_objects);

        let visible: Vec<CullableObject> = candidates
            .iter()
            .map(|&i| {
                let object = &mut objects[i];
                object.distance = distances[i];
                object.last_visible = now;
                object.clone()
            })
            .collect();

        self.stats = CullingStats {
            tested: objects.len(),
            visible: visible.len(),
            culled_by_frustum: objects.len() - passed_frustum,
            culled_by_cap: passed_frustum - visible.len(),
            culled_by_occlusion: 0,
            cells_rejected,
            efficiency: 0.0,
        };
        self.refresh_efficiency();
        visible
    }

    fn refresh_efficiency(&mut self) {
        self.stats.efficiency = if self.stats.tested == 0 {
            0.0
        } else {
            1.0 - self.stats.visible as f32 / self.stats.tested as f32
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> CullingConfig {
        CullingConfig {
            min_visible_objects: 2,
            ..CullingConfig::default()
        }
    }

    fn sphere(id: &str, x: f32, y: f32, priority: i32) -> CullableObject {
        CullableObject::new(id, BoundingVolume::sphere(Vec3::new(x, y, 0.0), 5.0), priority)
    }

    fn culler(max_visible: usize) -> FrustumCuller {
        let mut culler = FrustumCuller::new(&config(), max_visible);
        assert!(culler.update_camera(Camera::new(200.0, 200.0)));
        culler
    }

    #[test]
    fn test_empty_input_yields_empty_output() {
        let mut culler = culler(10);
        assert!(culler.cull_objects(&mut [], 0.0).is_empty());
        assert_eq!(culler.stats().efficiency, 0.0);
    }

    #[test]
    fn test_objects_outside_are_never_returned() {
        let mut culler = culler(10);
        let mut objects = vec![
            sphere("inside", 0.0, 0.0, 0),
            sphere("left", -200.0, 0.0, 5),
            sphere("above", 0.0, 300.0, 5),
        ];
        let visible = culler.cull_objects(&mut objects, 16.0);
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].id, "inside");
        assert_eq!(visible[0].last_visible, 16.0);
        assert_eq!(objects[1].last_visible, 0.0);
        assert_eq!(culler.stats().culled_by_frustum, 2);
    }

    #[test]
    fn test_sorted_by_priority_then_distance_and_capped() {
        let mut culler = culler(3);
        let mut objects = vec![
            sphere("far-low", 80.0, 0.0, 0),
            sphere("near-low", 10.0, 0.0, 0),
            sphere("far-high", 90.0, 0.0, 2),
            sphere("near-high", 20.0, 0.0, 2),
        ];
        let visible = culler.cull_objects(&mut objects, 0.0);
        let ids: Vec<&str> = visible.iter().map(|o| o.id.as_str()).collect();
        assert_eq!(ids, vec!["near-high", "far-high", "near-low"]);
        assert_eq!(culler.stats().culled_by_cap, 1);
        assert_eq!(visible[2].distance, 10.0);
    }

    #[test]
    fn test_zero_viewport_keeps_previous_frustum() {
        let mut culler = culler(10);
        let mut objects = vec![sphere("a", 50.0, 50.0, 0), sphere("b", 500.0, 0.0, 0)];
        let before = culler.cull_objects(&mut objects, 0.0);

        assert!(!culler.update_camera(Camera::new(0.0, 0.0)));
        let after = culler.cull_objects(&mut objects, 0.0);
        let ids = |v: &[CullableObject]| v.iter().map(|o| o.id.clone()).collect::<Vec<_>>();
        assert_eq!(ids(&before), ids(&after));
    }

    #[test]
    fn test_lod_buckets_include_overflow() {
        let mut culler = culler(10);
        let mut objects = vec![
            sphere("near", 10.0, 0.0, 0),
            sphere("mid", 60.0, 0.0, 0),
            sphere("far", 90.0, 0.0, 0),
        ];
        let buckets = culler.cull_by_lod(&mut objects, &[50.0, 80.0], 0.0);
        assert_eq!(buckets.levels.len(), 3);
        assert_eq!(buckets.level(0)[0].id, "near");
        assert_eq!(buckets.level(1)[0].id, "mid");
        assert_eq!(buckets.level(2)[0].id, "far");
        assert_eq!(buckets.total(), 3);
    }

    #[test]
    fn test_occluded_object_is_removed() {
        let mut culler = culler(10);
        let hidden = CullableObject::new(
            "hidden",
            BoundingVolume::aabb(Vec3::new(-5.0, -5.0, -10.0), Vec3::new(5.0, 5.0, -10.0)),
            0,
        );
        let beside = sphere("beside", 60.0, 0.0, 0);
        let occluder = BoundingVolume::aabb(Vec3::new(-20.0, -20.0, 0.0), Vec3::new(20.0, 20.0, 0.0));

        let kept = culler.cull_by_occlusion(&[hidden, beside], &[occluder]);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].id, "beside");
        assert_eq!(culler.stats().culled_by_occlusion, 1);
    }

    #[test]
    fn test_adaptive_budget_stays_in_bounds() {
        let mut culler = culler(100);
        let mut previous = culler.max_visible_objects();
        for fps in [50.0, 40.0, 20.0, 5.0, 0.0] {
            let budget = culler.adjust_budget(fps, 60.0);
            assert!(budget <= previous);
            assert!(budget >= 2);
            previous = budget;
        }
        assert_eq!(previous, 2);
        for _ in 0..200 {
            culler.adjust_budget(120.0, 60.0);
        }
        assert_eq!(culler.max_visible_objects(), 100);
        assert_eq!(culler.adjust_budget(60.0, 0.0), 100);
    }

    #[test]
    fn test_adaptive_shrink_is_monotone_in_deficit() {
        let shrink_to = |fps: f32| {
            let mut culler = culler(100);
            culler.adjust_budget(fps, 60.0)
        };
        assert!(shrink_to(30.0) <= shrink_to(45.0));
        assert!(shrink_to(10.0) <= shrink_to(30.0));
        assert_eq!(shrink_to(58.0), 100);
    }

    #[test]
    fn test_predictive_cull_keeps_incoming_objects() {
        let mut culler = culler(10);
        let mut objects = vec![
            sphere("incoming", 130.0, 0.0, 0).with_velocity(Vec3::new(-100.0, 0.0, 0.0)),
            sphere("leaving", 130.0, 0.0, 0).with_velocity(Vec3::new(100.0, 0.0, 0.0)),
        ];
        let visible = culler.predictive_cull(&mut objects, 0.5, 0.0);
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].id, "incoming");
    }

    #[test]
    fn test_spatial_cull_matches_plain_cull() {
        let mut culler = culler(100);
        let mut objects: Vec<CullableObject> = (0..40)
            .map(|i| sphere(&format!("o{}", i), (i as f32 - 20.0) * 15.0, (i % 7) as f32 * 30.0 - 90.0, 0))
            .collect();
        let plain: Vec<String> = culler.cull_objects(&mut objects, 0.0).into_iter().map(|o| o.id).collect();
        let spatial: Vec<String> = culler.spatial_cull(&mut objects, 64.0, 0.0).into_iter().map(|o| o.id).collect();
        assert_eq!(plain, spatial);
        assert!(culler.stats().cells_rejected > 0);
    }
}
