use async_trait::async_trait;
use image::GenericImageView;
use std::sync::Arc;

use crate::asset::{Asset, ContainerFormat, MediaKind};
use crate::error::ProbeFailure;
use crate::evidence::{keys, Layer, LayerResult};
use crate::probes::{blocking, Probe};

/// Byte signatures left behind by editing or generation tools.
const SOFTWARE_MARKERS: &[(&[u8], &str)] = &[
    (b"Adobe Photoshop", "Adobe Photoshop"),
    (b"Lightroom", "Adobe Lightroom"),
    (b"GIMP", "GIMP"),
    (b"Snapseed", "Snapseed"),
    (b"Canva", "Canva"),
    (b"Pixelmator", "Pixelmator"),
    (b"paint.net", "Paint.NET"),
];

/// Structural metadata consistency: container vs declared kind, decodability,
/// capture metadata, editing-tool traces.
pub struct MetadataProbe;

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|window| window == needle)
}

fn has_capture_metadata(format: ContainerFormat, bytes: &[u8]) -> bool {
    match format {
        // APP1 segment carrying an EXIF header.
        ContainerFormat::Jpeg => contains(bytes, b"Exif\0\0"),
        ContainerFormat::Png => contains(bytes, b"eXIf"),
        ContainerFormat::Webp => contains(bytes, b"EXIF"),
        _ => false,
    }
}

fn editing_software(bytes: &[u8]) -> Vec<&'static str> {
    SOFTWARE_MARKERS
        .iter()
        .filter(|(marker, _)| contains(bytes, marker))
        .map(|(_, name)| *name)
        .collect()
}

fn inspect(asset: &Asset) -> Result<LayerResult, ProbeFailure> {
    let bytes = asset.bytes();
    let Some(format) = asset.format() else {
        return Ok(LayerResult::fail(
            Layer::Metadata,
            70,
            "Unrecognized container format - structure cannot be validated",
        )
        .with_detail("declaredKind", asset.kind().to_string()));
    };

    if format.media_kind() != asset.kind() {
        return Ok(LayerResult::fail(
            Layer::Metadata,
            90,
            format!(
                "Declared {} but the container is {:?} ({})",
                asset.kind(),
                format,
                format.media_kind()
            ),
        )
        .with_detail("format", format.mime())
        .with_detail("declaredKind", asset.kind().to_string()));
    }

    let software = editing_software(bytes);

    if asset.kind() == MediaKind::Video {
        let result = if software.is_empty() {
            LayerResult::pass(Layer::Metadata, 75, "Container structure consistent with declared video format")
        } else {
            LayerResult::warning(Layer::Metadata, 70, "Container carries traces of editing software")
        };
        return Ok(result
            .with_detail("format", format.mime())
            .with_detail(keys::MODIFICATIONS, software.len() as u64)
            .with_detail("software", software));
    }

    let (width, height) = match image::load_from_memory(bytes) {
        Ok(img) => img.dimensions(),
        Err(e) => {
            return Ok(LayerResult::fail(
                Layer::Metadata,
                80,
                "Image data is corrupt or truncated",
            )
            .with_detail("format", format.mime())
            .with_detail("decodeError", e.to_string()));
        }
    };

    let exif = has_capture_metadata(format, bytes);
    let result = if !software.is_empty() {
        LayerResult::warning(
            Layer::Metadata,
            70,
            format!("Metadata shows processing by {}", software.join(", ")),
        )
    } else if exif {
        LayerResult::pass(
            Layer::Metadata,
            92,
            "EXIF and metadata patterns consistent with authentic capture device",
        )
    } else {
        LayerResult::warning(
            Layer::Metadata,
            60,
            "No capture metadata present - origin device cannot be confirmed",
        )
    };

    Ok(result
        .with_detail("format", format.mime())
        .with_detail("width", width)
        .with_detail("height", height)
        .with_detail("exif", exif)
        .with_detail(keys::MODIFICATIONS, software.len() as u64)
        .with_detail("software", software))
}

#[async_trait]
impl Probe for MetadataProbe {
    fn layer(&self) -> Layer {
        Layer::Metadata
    }

    async fn evaluate(&self, asset: Arc<Asset>) -> Result<LayerResult, ProbeFailure> {
        blocking(move || inspect(&asset)).await
    }
}
