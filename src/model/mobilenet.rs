//! MobileNetV2 Architecture
//!
//! The standard MobileNetV2 network (inverted residual blocks with linear
//! bottlenecks) built with the Burn framework. Parameter layout follows the
//! reference definition so that ImageNet weights converted to a Burn record
//! load directly before the classifier head is swapped for the plant classes.
//!
//! Feature layers are indexed in forward order: the stem is layer 0, the 17
//! inverted residual blocks are layers 1 to 17 and the 1x1 head convolution
//! is layer 18. The classifier is not a feature layer.

use burn::{
    config::Config,
    module::Module,
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig},
        BatchNorm, BatchNormConfig, Dropout, DropoutConfig, Linear, LinearConfig,
        PaddingConfig2d,
    },
    tensor::{activation::softmax, backend::Backend, Tensor},
};

/// Inverted residual settings: expansion factor, output channels, repeats, first stride
const INVERTED_RESIDUAL_SETTINGS: [[usize; 4]; 7] = [
    [1, 16, 1, 1],
    [6, 24, 2, 2],
    [6, 32, 3, 2],
    [6, 64, 4, 2],
    [6, 96, 3, 1],
    [6, 160, 3, 2],
    [6, 320, 1, 1],
];

const STEM_CHANNELS: usize = 32;
const LAST_CHANNELS: usize = 1280;
const CHANNEL_DIVISOR: usize = 8;

/// Configuration for the MobileNetV2 classifier
#[derive(Config, Debug)]
pub struct MobileNetV2Config {
    /// Width of the classifier output
    pub num_classes: usize,

    /// Channel width multiplier
    #[config(default = "1.0")]
    pub width_mult: f64,

    /// Dropout before the classifier
    #[config(default = "0.2")]
    pub dropout: f64,
}

impl MobileNetV2Config {
    /// Build the network on the given device
    pub fn init<B: Backend>(&self, device: &B::Device) -> MobileNetV2<B> {
        MobileNetV2::new(self, device)
    }
}

/// Round a channel count to the nearest multiple of `divisor`, never going
/// more than 10% below the requested value.
pub fn make_divisible(value: f64, divisor: usize) -> usize {
    let d = divisor as f64;
    let mut rounded = ((value + d / 2.0) / d).floor() * d;
    rounded = rounded.max(d);
    if rounded < 0.9 * value {
        rounded += d;
    }
    rounded as usize
}

/// Conv2d + BatchNorm + ReLU6
#[derive(Module, Debug)]
pub struct ConvBnRelu6<B: Backend> {
    pub conv: Conv2d<B>,
    pub bn: BatchNorm<B, 2>,
}

impl<B: Backend> ConvBnRelu6<B> {
    pub fn new(
        in_channels: usize,
        out_channels: usize,
        kernel_size: usize,
        stride: usize,
        groups: usize,
        device: &B::Device,
    ) -> Self {
        let padding = (kernel_size - 1) / 2;
        let conv = Conv2dConfig::new([in_channels, out_channels], [kernel_size, kernel_size])
            .with_stride([stride, stride])
            .with_padding(PaddingConfig2d::Explicit(padding, padding))
            .with_groups(groups)
            .with_bias(false)
            .init(device);

        let bn = BatchNormConfig::new(out_channels).init(device);

        Self { conv, bn }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.conv.forward(x);
        let x = self.bn.forward(x);
        x.clamp(0.0, 6.0)
    }
}

/// Inverted residual block with linear bottleneck
#[derive(Module, Debug)]
pub struct InvertedResidual<B: Backend> {
    /// 1x1 expansion, absent when the expansion factor is 1
    pub expand: Option<ConvBnRelu6<B>>,
    /// 3x3 depthwise convolution
    pub depthwise: ConvBnRelu6<B>,
    /// 1x1 linear projection
    pub project: Conv2d<B>,
    pub project_bn: BatchNorm<B, 2>,
    use_residual: bool,
}

impl<B: Backend> InvertedResidual<B> {
    pub fn new(
        in_channels: usize,
        out_channels: usize,
        stride: usize,
        expand_ratio: usize,
        device: &B::Device,
    ) -> Self {
        let hidden = in_channels * expand_ratio;

        let expand = if expand_ratio != 1 {
            Some(ConvBnRelu6::new(in_channels, hidden, 1, 1, 1, device))
        } else {
            None
        };

        let depthwise = ConvBnRelu6::new(hidden, hidden, 3, stride, hidden, device);

        let project = Conv2dConfig::new([hidden, out_channels], [1, 1])
            .with_bias(false)
            .init(device);
        let project_bn = BatchNormConfig::new(out_channels).init(device);

        Self {
            expand,
            depthwise,
            project,
            project_bn,
            use_residual: stride == 1 && in_channels == out_channels,
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let out = match &self.expand {
            Some(expand) => expand.forward(x.clone()),
            None => x.clone(),
        };
        let out = self.depthwise.forward(out);
        let out = self.project_bn.forward(self.project.forward(out));

        if self.use_residual {
            x + out
        } else {
            out
        }
    }

    pub fn has_residual(&self) -> bool {
        self.use_residual
    }
}

/// MobileNetV2 image classifier
#[derive(Module, Debug)]
pub struct MobileNetV2<B: Backend> {
    pub stem: ConvBnRelu6<B>,
    pub blocks: Vec<InvertedResidual<B>>,
    pub head: ConvBnRelu6<B>,
    pub pool: AdaptiveAvgPool2d,
    pub dropout: Dropout,
    pub classifier: Linear<B>,
    num_classes: usize,
}

impl<B: Backend> MobileNetV2<B> {
    /// Create a new MobileNetV2 from configuration
    pub fn new(config: &MobileNetV2Config, device: &B::Device) -> Self {
        let mut in_channels = make_divisible(STEM_CHANNELS as f64 * config.width_mult, CHANNEL_DIVISOR);
        let last_channels = make_divisible(
            LAST_CHANNELS as f64 * config.width_mult.max(1.0),
            CHANNEL_DIVISOR,
        );

        let stem = ConvBnRelu6::new(3, in_channels, 3, 2, 1, device);

        let mut blocks = Vec::new();
        for [t, c, n, s] in INVERTED_RESIDUAL_SETTINGS {
            let out_channels = make_divisible(c as f64 * config.width_mult, CHANNEL_DIVISOR);
            for i in 0..n {
                let stride = if i == 0 { s } else { 1 };
                blocks.push(InvertedResidual::new(in_channels, out_channels, stride, t, device));
                in_channels = out_channels;
            }
        }

        let head = ConvBnRelu6::new(in_channels, last_channels, 1, 1, 1, device);

        Self {
            stem,
            blocks,
            head,
            pool: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
            dropout: DropoutConfig::new(config.dropout).init(),
            classifier: LinearConfig::new(last_channels, config.num_classes).init(device),
            num_classes: config.num_classes,
        }
    }

    /// Forward pass: images [batch, 3, H, W] to logits [batch, num_classes]
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = self.features(x);

        let x = self.pool.forward(x);
        let [batch_size, channels, _, _] = x.dims();
        let x = x.reshape([batch_size, channels]);

        let x = self.dropout.forward(x);
        self.classifier.forward(x)
    }

    /// Forward pass with softmax for inference
    pub fn forward_softmax(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        softmax(self.forward(x), 1)
    }

    fn features(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let mut x = self.stem.forward(x);
        for block in &self.blocks {
            x = block.forward(x);
        }
        self.head.forward(x)
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    /// Number of feature layers (stem, every block, head)
    pub fn num_feature_layers(&self) -> usize {
        self.blocks.len() + 2
    }

    /// Input width of the classifier
    pub fn last_channels(&self) -> usize {
        self.classifier.weight.val().dims()[0]
    }

    /// Swap the classifier for a freshly initialised one with `num_classes` outputs
    pub fn replace_classifier(mut self, num_classes: usize, device: &B::Device) -> Self {
        self.classifier = LinearConfig::new(self.last_channels(), num_classes).init(device);
        self.num_classes = num_classes;
        self
    }

    /// Disable gradients for every feature layer except the last `trainable_layers`.
    ///
    /// The classifier always stays trainable.
    pub fn freeze_backbone(self, trainable_layers: usize) -> Self {
        let frozen = self.num_feature_layers().saturating_sub(trainable_layers);
        let Self {
            stem,
            blocks,
            head,
            pool,
            dropout,
            classifier,
            num_classes,
        } = self;

        let freeze_if = |layer_idx: usize| layer_idx < frozen;

        let stem = if freeze_if(0) { stem.no_grad() } else { stem };
        let head_idx = blocks.len() + 1;
        let blocks = blocks
            .into_iter()
            .enumerate()
            .map(|(i, block)| if freeze_if(i + 1) { block.no_grad() } else { block })
            .collect();
        let head = if freeze_if(head_idx) { head.no_grad() } else { head };

        Self {
            stem,
            blocks,
            head,
            pool,
            dropout,
            classifier,
            num_classes,
        }
    }

    /// Named shapes of every weight tensor, in forward order
    pub fn layer_shapes(&self) -> Vec<(String, Vec<usize>)> {
        self.clone().into_record().layer_shapes()
    }
}

type NamedShapes = Vec<(String, Vec<usize>)>;

impl<B: Backend> ConvBnRelu6Record<B> {
    fn push_shapes(&self, prefix: &str, out: &mut NamedShapes) {
        out.push((format!("{prefix}.conv.weight"), self.conv.weight.val().dims().to_vec()));
        out.push((format!("{prefix}.bn.gamma"), self.bn.gamma.val().dims().to_vec()));
    }
}

impl<B: Backend> InvertedResidualRecord<B> {
    fn push_shapes(&self, prefix: &str, out: &mut NamedShapes) {
        if let Some(expand) = &self.expand {
            expand.push_shapes(&format!("{prefix}.expand"), out);
        }
        self.depthwise.push_shapes(&format!("{prefix}.depthwise"), out);
        out.push((format!("{prefix}.project.weight"), self.project.weight.val().dims().to_vec()));
        out.push((format!("{prefix}.project_bn.gamma"), self.project_bn.gamma.val().dims().to_vec()));
    }
}

impl<B: Backend> MobileNetV2Record<B> {
    /// Named shapes of every weight tensor in a saved record, in forward order.
    ///
    /// Lets a file be checked against the architecture before it is loaded.
    pub fn layer_shapes(&self) -> NamedShapes {
        let mut shapes = Vec::new();
        self.stem.push_shapes("stem", &mut shapes);
        for (i, block) in self.blocks.iter().enumerate() {
            block.push_shapes(&format!("blocks.{i}"), &mut shapes);
        }
        self.head.push_shapes("head", &mut shapes);
        shapes.push((
            "classifier.weight".to_string(),
            self.classifier.weight.val().dims().to_vec(),
        ));
        shapes
    }
}
