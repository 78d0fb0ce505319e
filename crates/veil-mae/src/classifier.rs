//! Fine-tuning classifier over a pretrained MAE encoder.

use veil_core::{PrngKey, Result, Tensor};
use veil_nn::{LayerNorm, Params};
use veil_vit::Mlp;

use crate::config::ClassifierConfig;
use crate::encoder::MAEEncoder;

/// Classification head on top of the MAE encoder.
///
/// The mask ratio is a forward argument: 0 for standard fine-tuning, higher
/// for masked fine-tuning where the encoder sees a random patch subset.
/// Encoder parameters live under the `encoder.` prefix of the blob, so a
/// pretrained autoencoder checkpoint can seed them directly via
/// `Params::subset` / `merge_prefixed`.
#[derive(Debug, Clone)]
pub struct MAEClassifier {
    pub config: ClassifierConfig,
    encoder: MAEEncoder,
    fc_norm: LayerNorm,
    head: Mlp,
}

impl MAEClassifier {
    pub fn new(config: ClassifierConfig) -> Result<Self> {
        config.validate()?;
        let encoder = MAEEncoder::new(&config.backbone)?;
        let fc_norm = LayerNorm::new(config.backbone.embed_dim);
        let head = Mlp::new(
            config.backbone.embed_dim,
            config.head_hidden_dim,
            config.num_classes,
            config.backbone.drop_rate,
        );
        Ok(Self { config, encoder, fc_norm, head })
    }

    pub fn init_params(&self, key: PrngKey) -> Params {
        let mut params = Params::new();
        self.encoder.init(key.fold_in(0), &mut params, "encoder");
        self.fc_norm.init(&mut params, "fc_norm");
        self.head.init(key.fold_in(1), &mut params, "head");
        params
    }

    /// Classify an image batch, returning logits `(B, num_classes)`.
    pub fn forward(
        &self,
        params: &Params,
        images: &Tensor,
        mask_ratio: f32,
        train: bool,
        key: PrngKey,
    ) -> Result<Tensor> {
        self.forward_with_keys(
            params,
            images,
            mask_ratio,
            train,
            key.fold_in(0),
            key.fold_in(1),
            key.fold_in(2),
        )
    }

    /// As `forward`, but with explicit sub-keys for each stochastic site.
    #[allow(clippy::too_many_arguments)]
    pub fn forward_with_keys(
        &self,
        params: &Params,
        images: &Tensor,
        mask_ratio: f32,
        train: bool,
        drop_key: PrngKey,
        path_key: PrngKey,
        mask_key: PrngKey,
    ) -> Result<Tensor> {
        let (z, _, _) = self.encoder.forward(
            params,
            "encoder",
            images,
            mask_ratio,
            train,
            mask_key,
            drop_key.fold_in(0),
            path_key,
        )?;

        let feature = if self.config.global_pool {
            // mean over patch tokens, class token excluded
            let tokens = z.narrow(1, 1, z.shape().dims()[1] - 1)?;
            let pooled = tokens.mean_axis(1)?;
            self.fc_norm.forward(params, "fc_norm", &pooled)?
        } else {
            let normed = self.fc_norm.forward(params, "fc_norm", &z)?;
            let cls = normed.narrow(1, 0, 1)?;
            let dims = cls.shape().dims().to_vec();
            cls.reshape(&[dims[0] as isize, dims[2] as isize])?
        };

        self.head.forward(params, "head", &feature, train, drop_key.fold_in(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MAEConfig;
    use veil_core::PrngKey;

    fn config(global_pool: bool) -> ClassifierConfig {
        ClassifierConfig {
            backbone: MAEConfig::tiny(),
            num_classes: 10,
            head_hidden_dim: 64,
            global_pool,
        }
    }

    #[test]
    fn test_logit_shape_cls_token() {
        let clf = MAEClassifier::new(config(false)).unwrap();
        let params = clf.init_params(PrngKey::new(0));
        let images = PrngKey::new(1).uniform(&[2, 3, 16, 16]);
        let logits = clf.forward(&params, &images, 0.0, false, PrngKey::new(2)).unwrap();
        assert_eq!(logits.shape().dims(), &[2, 10]);
    }

    #[test]
    fn test_logit_shape_global_pool() {
        let clf = MAEClassifier::new(config(true)).unwrap();
        let params = clf.init_params(PrngKey::new(0));
        let images = PrngKey::new(1).uniform(&[2, 3, 16, 16]);
        let logits = clf.forward(&params, &images, 0.0, false, PrngKey::new(2)).unwrap();
        assert_eq!(logits.shape().dims(), &[2, 10]);
    }

    #[test]
    fn test_masked_forward() {
        // masked fine-tuning: the encoder sees half the patches but the
        // logits keep their shape, and the ratio changes the prediction
        for global_pool in [false, true] {
            let clf = MAEClassifier::new(config(global_pool)).unwrap();
            let params = clf.init_params(PrngKey::new(0));
            let images = PrngKey::new(1).uniform(&[2, 3, 16, 16]);

            let masked = clf.forward(&params, &images, 0.5, false, PrngKey::new(2)).unwrap();
            assert_eq!(masked.shape().dims(), &[2, 10]);

            let full = clf.forward(&params, &images, 0.0, false, PrngKey::new(2)).unwrap();
            assert_ne!(
                masked.as_f32_slice().unwrap(),
                full.as_f32_slice().unwrap(),
                "global_pool={global_pool}: masking should change the logits"
            );
        }
    }

    #[test]
    fn test_encoder_params_under_prefix() {
        let clf = MAEClassifier::new(config(false)).unwrap();
        let params = clf.init_params(PrngKey::new(0));
        assert!(params.contains("encoder.cls_token"));
        assert!(params.contains("fc_norm.weight"));
        assert!(params.contains("head.fc2.bias"));
    }

    #[test]
    fn test_pretrained_encoder_transfer() {
        // pretrain-style blob -> extract encoder -> merge into classifier blob
        let model = crate::model::MAEViT::new(MAEConfig::tiny()).unwrap();
        let pretrain = model.init_params(PrngKey::new(0));
        let encoder_only = pretrain.subset("encoder");

        let clf = MAEClassifier::new(config(false)).unwrap();
        let mut params = clf.init_params(PrngKey::new(1));
        params.merge_prefixed("encoder", &encoder_only);

        let images = PrngKey::new(2).uniform(&[1, 3, 16, 16]);
        let logits = clf.forward(&params, &images, 0.0, false, PrngKey::new(3)).unwrap();
        assert_eq!(logits.shape().dims(), &[1, 10]);
    }
}
