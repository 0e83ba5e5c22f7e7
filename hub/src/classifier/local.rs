//! In-process heuristic tier: no network call, used when cloud tiers are
//! unreachable or rate-limited. Re-scores the reconstructed grid with the
//! same band-ratio reasoning the node's anomaly gate uses, since the hub
//! has no local ML model to fall back to.

use super::{derive_threat_level, ClassificationResult, Label};
use crate::error::ClassifierError;
use async_trait::async_trait;
use image::GenericImageView;

pub struct LocalClassifier;

#[async_trait]
impl super::Classifier for LocalClassifier {
    fn tier_name(&self) -> &'static str {
        "local"
    }

    async fn classify(&self, image_bytes: &[u8]) -> Result<ClassificationResult, ClassifierError> {
        let image = image::load_from_memory(image_bytes).map_err(|_| ClassifierError::BadResponse)?;
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(ClassifierError::BadResponse);
        }

        let high_rows = 0..(height / 4);
        let low_rows = (height - height / 4)..height;

        let mut high_sum = 0u64;
        let mut low_sum = 0u64;
        let mut total_sum = 0u64;
        for y in 0..height {
            for x in 0..width {
                let px = image.get_pixel(x, y).0[0] as u64;
                total_sum += px;
                if high_rows.contains(&y) {
                    high_sum += px;
                } else if low_rows.contains(&y) {
                    low_sum += px;
                }
            }
        }

        if total_sum == 0 {
            return Ok(ClassificationResult {
                label: Label::Natural,
                confidence: 60,
                threat_level: derive_threat_level(Label::Natural, 60),
                reasoning: Some("silent spectrogram".into()),
                features: vec![],
                tier: self.tier_name(),
            });
        }

        let high_ratio = high_sum as f64 / total_sum as f64;
        let low_ratio = low_sum as f64 / total_sum as f64;

        let (label, confidence) = if high_ratio > 0.35 {
            (Label::Chainsaw, (55.0 + high_ratio * 100.0).min(90.0) as u8)
        } else if low_ratio > 0.4 {
            (Label::Vehicle, (50.0 + low_ratio * 60.0).min(80.0) as u8)
        } else {
            (Label::Unknown, 45)
        };

        Ok(ClassificationResult {
            label,
            confidence,
            threat_level: derive_threat_level(label, confidence),
            reasoning: Some(format!("local heuristic: high_ratio={high_ratio:.2} low_ratio={low_ratio:.2}")),
            features: vec![],
            tier: self.tier_name(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::Classifier;

    fn png_with_top_bright(width: u32, height: u32) -> Vec<u8> {
        let mut img = image::GrayImage::new(width, height);
        for y in 0..height / 4 {
            for x in 0..width {
                img.put_pixel(x, y, image::Luma([250]));
            }
        }
        let mut bytes = Vec::new();
        img.write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageOutputFormat::Png).unwrap();
        bytes
    }

    #[tokio::test]
    async fn high_band_energy_is_classified_as_chainsaw() {
        let classifier = LocalClassifier;
        let bytes = png_with_top_bright(32, 32);
        let result = classifier.classify(&bytes).await.unwrap();
        assert_eq!(result.label, Label::Chainsaw);
    }

    #[tokio::test]
    async fn silent_image_does_not_panic() {
        let classifier = LocalClassifier;
        let img = image::GrayImage::new(32, 32);
        let mut bytes = Vec::new();
        img.write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageOutputFormat::Png).unwrap();
        let result = classifier.classify(&bytes).await.unwrap();
        assert_eq!(result.label, Label::Natural);
    }
}
