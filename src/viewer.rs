use crate::{
    camera::{Camera, OrbitController, Projection, fit_camera},
    catalog::ModelCatalog,
    config::ViewerConfig,
    error::ViewerError,
    scene::{Disposable, Model},
};
use cgmath::{Point3, Rad};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewerState {
    /// Nothing displayed yet
    Uninitialized,
    /// A load is in flight; the previous model, if any, is still shown
    Loading,
    Displaying,
}

/// A model fetch the host should run and hand back to
/// [`Viewer::complete_load`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadRequest {
    pub id: u64,
    pub path: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// The model replaced whatever was shown before
    Displayed,
    /// The load failed; nothing changed on screen
    Failed,
    /// A newer request was issued meanwhile; the result was dropped
    Stale,
}

/// Everything the viewer knows that is not a GPU object: which model is
/// selected, the model on screen, and the camera looking at it.
///
/// Loads are identified by increasing request ids. Only the most recently
/// issued request may replace the displayed model, so a slow load that
/// finishes after a newer one never overwrites it.
pub struct Viewer<M> {
    catalog: ModelCatalog,
    model: Option<Model<M>>,
    pub camera: Camera,
    pub projection: Projection,
    pub controller: OrbitController,
    state: ViewerState,
    latest_request: u64,
    title: String,
    idle_rotation: Rad<f32>,
}

impl<M: Disposable> Viewer<M> {
    pub fn new(config: &ViewerConfig, width: u32, height: u32) -> Result<Self, ViewerError> {
        config.validate()?;
        let catalog = ModelCatalog::new(config.models.clone())?;
        let camera = Camera::new(Point3::from(config.camera.position), Point3::new(0.0, 0.0, 0.0));
        let projection = Projection::from_config(width, height, &config.camera);
        let controller = OrbitController::new(&camera, &config.orbit);

        Ok(Self {
            catalog,
            model: None,
            camera,
            projection,
            controller,
            state: ViewerState::Uninitialized,
            latest_request: 0,
            title: String::new(),
            idle_rotation: Rad(config.idle_rotation),
        })
    }

    pub fn state(&self) -> ViewerState {
        self.state
    }

    pub fn model(&self) -> Option<&Model<M>> {
        self.model.as_ref()
    }

    pub fn catalog(&self) -> &ModelCatalog {
        &self.catalog
    }

    /// Path of the model on screen, empty before the first successful load.
    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn is_current(&self, request_id: u64) -> bool {
        request_id == self.latest_request
    }

    /// Requests the currently selected model.
    pub fn reload(&mut self) -> LoadRequest {
        self.latest_request += 1;
        self.state = ViewerState::Loading;
        LoadRequest {
            id: self.latest_request,
            path: self.catalog.current().to_string(),
        }
    }

    pub fn next(&mut self) -> LoadRequest {
        self.catalog.advance();
        self.reload()
    }

    pub fn previous(&mut self) -> LoadRequest {
        self.catalog.retreat();
        self.reload()
    }

    pub fn complete_load(
        &mut self,
        request: &LoadRequest,
        result: Result<Model<M>, ViewerError>,
    ) -> LoadOutcome {
        if !self.is_current(request.id) {
            log::warn!(
                "Discarding load of {} (request {}), superseded by request {}",
                request.path,
                request.id,
                self.latest_request
            );
            if let Ok(model) = result {
                model.dispose();
            }
            return LoadOutcome::Stale;
        }

        match result {
            Ok(model) => {
                log::info!("Loaded model {}", request.path);
                self.replace_model(model);
                self.title = request.path.clone();
                self.state = ViewerState::Displaying;
                LoadOutcome::Displayed
            }
            Err(e) => {
                log::error!("{}", e);
                self.state = if self.model.is_some() {
                    ViewerState::Displaying
                } else {
                    ViewerState::Uninitialized
                };
                LoadOutcome::Failed
            }
        }
    }

    fn replace_model(&mut self, model: Model<M>) {
        if let Some(previous) = self.model.take() {
            let released = previous.dispose();
            log::debug!("Released {} meshes of {}", released, self.title);
        }
        fit_camera(
            &mut self.camera,
            &self.projection,
            &mut self.controller,
            &model.bounds,
        );
        self.model = Some(model);
    }

    /// Advances one frame: orbit damping, then the idle spin.
    pub fn tick(&mut self) {
        self.controller.update(&mut self.camera);
        if let Some(model) = &mut self.model {
            model.rotate_y(self.idle_rotation);
        }
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.projection.resize(width, height);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bounds::Aabb;
    use crate::scene::tests::{TrackedMesh, tracked_tree};
    use approx::assert_relative_eq;
    use std::cell::RefCell;
    use std::rc::Rc;

    type Released = Rc<RefCell<Vec<u32>>>;

    /// Records log output per test thread so parallel tests do not see
    /// each other's entries.
    mod captured_log {
        use log::{Level, LevelFilter, Log, Metadata, Record};
        use std::cell::RefCell;
        use std::sync::Once;

        thread_local! {
            static RECORDS: RefCell<Vec<(Level, String)>> = const { RefCell::new(Vec::new()) };
        }

        struct ThreadLogger;

        impl Log for ThreadLogger {
            fn enabled(&self, _: &Metadata) -> bool {
                true
            }

            fn log(&self, record: &Record) {
                RECORDS.with(|records| {
                    records
                        .borrow_mut()
                        .push((record.level(), record.args().to_string()))
                });
            }

            fn flush(&self) {}
        }

        static LOGGER: ThreadLogger = ThreadLogger;
        static INSTALL: Once = Once::new();

        /// Installs the recorder once and forgets this thread's earlier entries.
        pub fn reset() {
            INSTALL.call_once(|| {
                log::set_logger(&LOGGER).expect("no other logger in tests");
                log::set_max_level(LevelFilter::Trace);
            });
            RECORDS.with(|records| records.borrow_mut().clear());
        }

        pub fn at(level: Level) -> Vec<String> {
            RECORDS.with(|records| {
                records
                    .borrow()
                    .iter()
                    .filter(|(l, _)| *l == level)
                    .map(|(_, message)| message.clone())
                    .collect()
            })
        }
    }

    fn viewer() -> Viewer<TrackedMesh> {
        let config = ViewerConfig {
            models: vec!["A".into(), "B".into(), "C".into()],
            ..ViewerConfig::default()
        };
        Viewer::new(&config, 800, 600).unwrap()
    }

    fn model(path: &str, first_id: u32, released: &Released) -> Model<TrackedMesh> {
        let bounds = Aabb::from_points([Point3::new(-1.0, -1.0, -1.0), Point3::new(1.0, 1.0, 1.0)]);
        Model::new(path, tracked_tree(first_id, released), bounds)
    }

    fn failure(path: &str) -> ViewerError {
        ViewerError::asset_load(path, anyhow::anyhow!("404 Not Found"))
    }

    #[test]
    fn starts_uninitialized_and_requests_first_model() {
        let mut viewer = viewer();
        assert_eq!(viewer.state(), ViewerState::Uninitialized);
        assert!(viewer.model().is_none());

        let request = viewer.reload();
        assert_eq!(request.path, "A");
        assert_eq!(viewer.state(), ViewerState::Loading);
    }

    #[test]
    fn successful_load_displays_and_fits_the_model() {
        let released = Released::default();
        let mut viewer = viewer();
        let request = viewer.reload();

        let outcome = viewer.complete_load(&request, Ok(model("A", 0, &released)));

        assert_eq!(outcome, LoadOutcome::Displayed);
        assert_eq!(viewer.state(), ViewerState::Displaying);
        assert_eq!(viewer.title(), "A");
        assert_eq!(viewer.model().unwrap().path, "A");
        assert_eq!(viewer.camera.target, Point3::new(0.0, 0.0, 0.0));
        assert_eq!(viewer.controller.target(), Point3::new(0.0, 0.0, 0.0));
        assert!(released.borrow().is_empty());
    }

    #[test]
    fn replacing_a_model_releases_the_old_one_exactly_once() {
        let released = Released::default();
        let mut viewer = viewer();

        let first = viewer.reload();
        viewer.complete_load(&first, Ok(model("A", 0, &released)));
        let second = viewer.next();
        assert_eq!(second.path, "B");
        viewer.complete_load(&second, Ok(model("B", 100, &released)));

        let mut ids = released.borrow().clone();
        ids.sort();
        assert_eq!(ids, vec![0, 1, 2, 3]);
        assert_eq!(viewer.model().unwrap().path, "B");
        assert_eq!(viewer.model().unwrap().root.mesh_count(), 4);
    }

    #[test]
    fn navigation_scenario_wraps_both_ways() {
        let mut viewer = viewer();
        viewer.reload();

        assert_eq!(viewer.next().path, "B");
        assert_eq!(viewer.next().path, "C");
        assert_eq!(viewer.catalog().index(), 2);
        assert_eq!(viewer.next().path, "A");
        assert_eq!(viewer.catalog().index(), 0);

        assert_eq!(viewer.previous().path, "C");
        assert_eq!(viewer.catalog().index(), 2);
    }

    #[test]
    fn full_cycle_rerequests_the_starting_path() {
        let mut viewer = viewer();
        let first = viewer.reload();
        let mut last = None;
        for _ in 0..viewer.catalog().len() {
            last = Some(viewer.next());
        }
        let last = last.unwrap();
        assert_eq!(last.path, first.path);
        assert!(last.id > first.id);
    }

    #[test]
    fn failed_load_keeps_the_displayed_model() {
        let released = Released::default();
        let mut viewer = viewer();
        let first = viewer.reload();
        viewer.complete_load(&first, Ok(model("A", 0, &released)));
        let camera_before = viewer.camera;

        let request = viewer.next();
        let outcome = viewer.complete_load(&request, Err(failure("B")));

        assert_eq!(outcome, LoadOutcome::Failed);
        assert_eq!(viewer.state(), ViewerState::Displaying);
        assert_eq!(viewer.title(), "A");
        assert_eq!(viewer.model().unwrap().path, "A");
        assert_eq!(viewer.camera, camera_before);
        assert!(released.borrow().is_empty());

        // navigation keeps working afterwards
        let request = viewer.next();
        assert_eq!(request.path, "C");
        assert_eq!(
            viewer.complete_load(&request, Ok(model("C", 10, &released))),
            LoadOutcome::Displayed
        );
        assert_eq!(released.borrow().len(), 4);
    }

    #[test]
    fn failed_first_load_returns_to_uninitialized() {
        let mut viewer = viewer();
        let request = viewer.reload();
        assert_eq!(
            viewer.complete_load(&request, Err(failure("A"))),
            LoadOutcome::Failed
        );
        assert_eq!(viewer.state(), ViewerState::Uninitialized);
        assert!(viewer.model().is_none());
    }

    #[test]
    fn stale_completion_is_discarded_and_released() {
        let released = Released::default();
        let mut viewer = viewer();
        let slow = viewer.reload();
        let fast = viewer.next();
        assert_eq!(viewer.state(), ViewerState::Loading);

        assert_eq!(
            viewer.complete_load(&fast, Ok(model("B", 100, &released))),
            LoadOutcome::Displayed
        );
        assert_eq!(
            viewer.complete_load(&slow, Ok(model("A", 0, &released))),
            LoadOutcome::Stale
        );

        assert_eq!(viewer.model().unwrap().path, "B");
        assert_eq!(viewer.title(), "B");
        let mut ids = released.borrow().clone();
        ids.sort();
        assert_eq!(ids, vec![0, 1, 2, 3]);
    }

    #[test]
    fn stale_failure_does_not_touch_state() {
        let mut viewer = viewer();
        let stale = viewer.reload();
        viewer.next();
        assert_eq!(
            viewer.complete_load(&stale, Err(failure("A"))),
            LoadOutcome::Stale
        );
        assert_eq!(viewer.state(), ViewerState::Loading);
    }

    #[test]
    fn tick_spins_only_a_loaded_model() {
        let released = Released::default();
        let mut viewer = viewer();
        viewer.tick();

        let request = viewer.reload();
        viewer.complete_load(&request, Ok(model("A", 0, &released)));
        for _ in 0..10 {
            viewer.tick();
        }

        assert_relative_eq!(viewer.model().unwrap().rotation.0, 0.05, epsilon = 1e-6);
    }

    #[test]
    fn ticks_keep_the_fitted_camera_still() {
        let released = Released::default();
        let mut viewer = viewer();
        let request = viewer.reload();
        viewer.complete_load(&request, Ok(model("A", 0, &released)));
        let fitted = viewer.camera.position;

        for _ in 0..5 {
            viewer.tick();
        }

        assert_relative_eq!(viewer.camera.position.x, fitted.x, epsilon = 1e-4);
        assert_relative_eq!(viewer.camera.position.y, fitted.y, epsilon = 1e-4);
        assert_relative_eq!(viewer.camera.position.z, fitted.z, epsilon = 1e-4);
    }

    #[test]
    fn failed_load_logs_exactly_one_error() {
        let released = Released::default();
        let mut viewer = viewer();
        let first = viewer.reload();
        viewer.complete_load(&first, Ok(model("A", 0, &released)));

        captured_log::reset();
        let request = viewer.next();
        viewer.complete_load(&request, Err(failure("B")));

        let errors = captured_log::at(log::Level::Error);
        assert_eq!(errors.len(), 1, "{:?}", errors);
        assert!(errors[0].contains("'B'"));
        assert!(errors[0].contains("404 Not Found"));
    }

    #[test]
    fn stale_failure_logs_no_error() {
        let mut viewer = viewer();
        let stale = viewer.reload();
        viewer.next();

        captured_log::reset();
        viewer.complete_load(&stale, Err(failure("A")));

        assert!(captured_log::at(log::Level::Error).is_empty());
        assert_eq!(captured_log::at(log::Level::Warn).len(), 1);
    }

    #[test]
    fn zero_width_surface_still_projects() {
        let viewer: Viewer<TrackedMesh> = Viewer::new(&ViewerConfig::default(), 0, 600).unwrap();
        let view_proj = viewer.projection.calc_matrix() * viewer.camera.calc_matrix();
        assert!(view_proj.x.x.is_finite());
    }

    #[test]
    fn invalid_clip_planes_are_rejected_at_construction() {
        let mut config = ViewerConfig::default();
        config.camera.znear = 0.0;
        assert!(matches!(
            Viewer::<TrackedMesh>::new(&config, 800, 600),
            Err(ViewerError::Config(_))
        ));

        config.camera.znear = 1.0;
        config.camera.zfar = 1.0;
        assert!(Viewer::<TrackedMesh>::new(&config, 800, 600).is_err());
    }
}
