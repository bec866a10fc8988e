//! Test data builders for creating pipelines and images

use chromaflow::pipeline::nodes::{OUTPUT, ROOT};
use chromaflow::pipeline::{
    ContextCache, Conversion, FilterModule, Image, ImageHandle, ModuleRegistry, NodeId, Options,
    Pipeline, PixelLayout,
};
use chromaflow::EngineConfig;
use std::sync::Arc;

/// Solid RGB image
pub fn solid_image(width: usize, height: usize, rgb: [f32; 3]) -> ImageHandle {
    let samples = rgb.repeat(width * height);
    ImageHandle::new(Image::from_samples(width, height, PixelLayout::RGB, samples).unwrap())
}

/// RGB image whose red channel encodes `x` and green channel encodes `y`
pub fn gradient_image(width: usize, height: usize) -> ImageHandle {
    let mut image = Image::new(width, height, PixelLayout::RGB);
    for y in 0..height {
        for x in 0..width {
            let px = image.pixel_mut(x, y);
            px[0] = x as f32 / width as f32;
            px[1] = y as f32 / height as f32;
            px[2] = 0.5;
        }
    }
    ImageHandle::new(image)
}

/// Builder for root → stages → output conversions
pub struct ChainBuilder {
    registry: ModuleRegistry,
    config: EngineConfig,
    cache: Option<Arc<ContextCache>>,
    stages: Vec<(String, Options)>,
    input: Option<ImageHandle>,
}

impl ChainBuilder {
    pub fn new() -> Self {
        Self {
            registry: ModuleRegistry::with_builtins(),
            config: EngineConfig::default(),
            cache: None,
            stages: Vec::new(),
            input: None,
        }
    }

    pub fn module(mut self, module: FilterModule) -> Self {
        self.registry.register(module);
        self
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Use this cache instead of a fresh private one
    pub fn cache(mut self, cache: Arc<ContextCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn stage(mut self, registration: &str, options: Options) -> Self {
        self.stages.push((registration.to_string(), options));
        self
    }

    pub fn input(mut self, image: ImageHandle) -> Self {
        self.input = Some(image);
        self
    }

    /// Build the conversion. Returns it with the ids of the stage nodes.
    pub fn build(self) -> (Conversion, Vec<NodeId>) {
        let cache = self
            .cache
            .unwrap_or_else(|| Arc::new(ContextCache::new()));
        let mut pipeline = Pipeline::with_cache(Arc::new(self.registry), self.config, cache);
        let root = pipeline.new_node(ROOT, Options::new()).unwrap();
        let mut prev = root;
        let mut ids = Vec::new();
        for (registration, options) in self.stages {
            let id = pipeline.new_node(&registration, options).unwrap();
            pipeline.connect(prev, 0, id, 0).unwrap();
            ids.push(id);
            prev = id;
        }
        let output = pipeline.new_node(OUTPUT, Options::new()).unwrap();
        pipeline.connect(prev, 0, output, 0).unwrap();

        let mut conversion = Conversion::new(pipeline, root, output).unwrap();
        if let Some(image) = self.input {
            conversion.set_input_image(image).unwrap();
        }
        (conversion, ids)
    }
}

impl Default for ChainBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chromaflow::pipeline::nodes::MATRIX;

    #[test]
    fn test_chain_builder() {
        let (conversion, ids) = ChainBuilder::new()
            .stage(MATRIX, Options::new())
            .input(solid_image(2, 2, [0.1, 0.2, 0.3]))
            .build();

        assert_eq!(ids.len(), 1);
        assert_eq!(conversion.pipeline().node_count(), 3);
        assert!(conversion.input_image().is_some());
    }
}
