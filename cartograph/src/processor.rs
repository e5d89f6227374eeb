//! Walks the layers of a map and feeds the matching symbolizers of every feature to a renderer.

use std::collections::BTreeMap;

use cartograph_types::Box2d;

use crate::datasource::{Datasource, DatasourceError, Query};
use crate::error::CartographError;
use crate::feature::Feature;
use crate::map::{Layer, Map};
use crate::projection::ProjTransform;
use crate::render::Renderer;
use crate::style::{ActiveRules, FeatureTypeStyle};

/// Counters of one rendered layer.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LayerStats {
    /// Features read from the datasource.
    pub features_processed: usize,
    /// Symbolizers that failed to render a feature.
    pub symbolizer_failures: usize,
}

/// Outcome of [`FeatureStyleProcessor::apply`].
#[derive(Debug, Default)]
pub struct RenderReport {
    /// Statistics by layer name. Only the layers that were queried are listed.
    pub layers: BTreeMap<String, LayerStats>,
    /// Errors that stopped rendering of a layer. The other layers are rendered anyway.
    pub layer_errors: Vec<CartographError>,
}

impl RenderReport {
    /// Statistics of the layer.
    pub fn layer(&self, name: &str) -> Option<&LayerStats> {
        self.layers.get(name)
    }

    /// Returns true if every feature was rendered without errors.
    pub fn is_complete(&self) -> bool {
        self.layer_errors.is_empty()
            && self
                .layers
                .values()
                .all(|stats| stats.symbolizer_failures == 0)
    }
}

/// Drives a [`Renderer`] through the layers, styles, rules and features of a [`Map`].
pub struct FeatureStyleProcessor<'a, R: Renderer + ?Sized> {
    map: &'a Map,
    renderer: &'a mut R,
}

struct LayerJob<'a> {
    layer: &'a Layer,
    datasource: &'a dyn Datasource,
    styles: Vec<(&'a FeatureTypeStyle, ActiveRules<'a>)>,
    prj_trans: ProjTransform,
    query: Query,
}

impl<'a, R: Renderer + ?Sized> FeatureStyleProcessor<'a, R> {
    /// Creates a processor rendering the map with the renderer.
    pub fn new(map: &'a Map, renderer: &'a mut R) -> Self {
        Self { map, renderer }
    }

    /// Renders the map.
    ///
    /// If `scale_denominator` is not given, it is calculated from the current map extent.
    /// Failures of single symbolizers and datasources are logged and recorded in the returned
    /// report, only an invalid map or renderer setup results in an error.
    pub fn apply(
        &mut self,
        scale_denominator: Option<f64>,
    ) -> Result<RenderReport, CartographError> {
        let map = self.map;
        map.validate()?;
        let scale_denominator = scale_denominator.unwrap_or_else(|| map.scale_denominator());
        log::debug!(
            "Rendering map {}x{} at extent {:?}, scale 1:{scale_denominator:.0}",
            map.width(),
            map.height(),
            map.current_extent()
        );

        let mut report = RenderReport::default();
        self.renderer.start_map_processing(map)?;

        for layer in map.layers() {
            if !layer.is_visible(scale_denominator) {
                log::trace!("Layer {} is not visible at 1:{scale_denominator:.0}", layer.name());
                continue;
            }

            let Some(job) = self.prepare_layer(layer, scale_denominator)? else {
                continue;
            };

            let mut stats = LayerStats::default();
            if let Err(source) = self.render_layer(&job, &mut stats) {
                log::error!("Failed to render layer {}: {source}", layer.name());
                report.layer_errors.push(CartographError::Datasource {
                    layer: layer.name().to_string(),
                    source,
                });
            }

            log::debug!(
                "Layer {} done: {} features, {} failed symbolizers",
                layer.name(),
                stats.features_processed,
                stats.symbolizer_failures
            );
            report.layers.insert(layer.name().to_string(), stats);
        }

        self.renderer.end_map_processing(map)?;
        Ok(report)
    }

    /// Resolves styles and the query of the layer. Returns `None` if there is nothing to render.
    fn prepare_layer(
        &self,
        layer: &'a Layer,
        scale_denominator: f64,
    ) -> Result<Option<LayerJob<'a>>, CartographError> {
        let map = self.map;
        let Some(datasource) = layer.datasource() else {
            log::debug!("Layer {} has no datasource", layer.name());
            return Ok(None);
        };

        let mut styles = vec![];
        for name in layer.styles() {
            let Some(style) = map.style(name) else {
                log::warn!("Style {name} of layer {} is not defined", layer.name());
                continue;
            };

            let rules = style.active_rules(scale_denominator);
            if !rules.is_empty() {
                styles.push((style, rules));
            }
        }

        if styles.is_empty() {
            log::trace!("Layer {} has no active rules", layer.name());
            return Ok(None);
        }

        let prj_trans = ProjTransform::new(layer.srs(), map.srs())?;
        let Some(query_extent) = query_extent(map, layer, &prj_trans) else {
            return Ok(None);
        };

        let mut query = Query::new(query_extent)
            .with_resolution((
                query_extent.width() / map.width() as f64,
                query_extent.height() / map.height() as f64,
            ))
            .with_scale_denominator(scale_denominator);
        query.variables = map.variables().clone();
        for (_, rules) in &styles {
            query.property_names.extend(rules.attributes());
        }

        Ok(Some(LayerJob {
            layer,
            datasource: datasource.as_ref(),
            styles,
            prj_trans,
            query,
        }))
    }

    fn render_layer(
        &mut self,
        job: &LayerJob,
        stats: &mut LayerStats,
    ) -> Result<(), DatasourceError> {
        log::debug!(
            "Rendering layer {} with {} styles, query extent {:?}",
            job.layer.name(),
            job.styles.len(),
            job.query.bbox
        );

        self.renderer.start_layer_processing(job.layer, job.query.bbox);
        let result = if job.styles.len() == 1 && !job.layer.cache_features() {
            self.stream_features(job, stats)
        } else {
            self.replay_features(job, stats)
        };
        self.renderer.end_layer_processing(job.layer);

        result
    }

    /// Single style: features are rendered as they are read.
    fn stream_features(
        &mut self,
        job: &LayerJob,
        stats: &mut LayerStats,
    ) -> Result<(), DatasourceError> {
        let (style, rules) = &job.styles[0];
        let features = job.datasource.features(&job.query)?;

        self.renderer.start_style_processing(style);
        let mut result = Ok(());
        for feature in features {
            match feature {
                Ok(feature) => {
                    stats.features_processed += 1;
                    self.render_feature(job, rules, &feature, stats);
                }
                Err(err) => {
                    result = Err(err);
                    break;
                }
            }
        }
        self.renderer.end_style_processing(style);

        result
    }

    /// Several styles: the featureset is read once and replayed for every style.
    fn replay_features(
        &mut self,
        job: &LayerJob,
        stats: &mut LayerStats,
    ) -> Result<(), DatasourceError> {
        let features = job
            .datasource
            .features(&job.query)?
            .collect::<Result<Vec<Feature>, _>>()?;
        stats.features_processed = features.len();

        for (style, rules) in &job.styles {
            self.renderer.start_style_processing(style);
            for feature in &features {
                self.render_feature(job, rules, feature, stats);
            }
            self.renderer.end_style_processing(style);
        }

        Ok(())
    }

    fn render_feature(
        &mut self,
        job: &LayerJob,
        rules: &ActiveRules,
        feature: &Feature,
        stats: &mut LayerStats,
    ) {
        for rule in rules.matching(feature, &job.query.variables) {
            for symbolizer in &rule.symbolizers {
                log::trace!(
                    "Rendering feature {} with {} symbolizer",
                    feature.id(),
                    symbolizer.kind()
                );
                if let Err(err) = self.renderer.process(symbolizer, feature, &job.prj_trans) {
                    log::error!(
                        "Failed to render feature {} of layer {} with {} symbolizer: {err}",
                        feature.id(),
                        job.layer.name(),
                        symbolizer.kind()
                    );
                    stats.symbolizer_failures += 1;
                }
            }
        }
    }
}

/// Current map extent buffered by the layer (or map) buffer size, limited by the maximum extents
/// and transformed into the layer SRS.
fn query_extent(map: &Map, layer: &Layer, prj_trans: &ProjTransform) -> Option<Box2d> {
    let extent = map.current_extent();
    let buffer_size = layer.buffer_size().unwrap_or(map.buffer_size()) as f64;
    let mut buffered = extent.pad(buffer_size * extent.width() / map.width() as f64);
    if let Some(maximum_extent) = map.maximum_extent() {
        buffered = buffered.intersect(&maximum_extent);
    }

    let mut query_extent = match prj_trans.backward_box(&buffered) {
        Ok(bbox) => bbox,
        Err(err) => {
            log::debug!("Skipping layer {}: cannot transform query extent: {err}", layer.name());
            return None;
        }
    };

    if let Some(maximum_extent) = layer.maximum_extent() {
        query_extent = query_extent.intersect(&maximum_extent);
    }

    if !query_extent.is_valid() {
        log::debug!("Skipping layer {}: query extent is empty", layer.name());
        return None;
    }

    Some(query_extent)
}
