use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::nn::pool::{MaxPool2d, MaxPool2dConfig};
use burn::nn::{BiLstm, BiLstmConfig, Linear, LinearConfig, PaddingConfig2d, Relu};
use burn::prelude::*;

/// Input height the convolutional backbone collapses to a single row.
pub const INPUT_HEIGHT: usize = 32;

/// Convolutional recurrent network for line-level text recognition.
///
/// ```text
/// Input:  [batch, 1, 32, W]
/// Conv1:  1 -> 64,    3x3 pad 1, ReLU, MaxPool 2x2   =>  [batch, 64, 16, W/2]
/// Conv2:  64 -> 128,  3x3 pad 1, ReLU, MaxPool 2x2   =>  [batch, 128, 8, W/4]
/// Conv3:  128 -> 256, 3x3 pad 1, ReLU, MaxPool 2x1   =>  [batch, 256, 4, W/4]
/// Conv4:  256 -> 256, 3x3 pad 1, ReLU, MaxPool 2x1   =>  [batch, 256, 2, W/4]
/// Conv5:  256 -> 512, 2x1,       ReLU                =>  [batch, 512, 1, W/4]
/// Squeeze + transpose                                =>  [batch, W/4, 512]
/// BiLSTM: 512 -> 2 * hidden                          =>  [batch, W/4, 2 * hidden]
/// FC:     2 * hidden -> num_classes                  =>  [batch, W/4, num_classes]
/// ```
#[derive(Module, Debug)]
pub struct Crnn<B: Backend> {
    conv1: Conv2d<B>,
    conv2: Conv2d<B>,
    conv3: Conv2d<B>,
    conv4: Conv2d<B>,
    conv5: Conv2d<B>,
    pool_square: MaxPool2d,
    pool_tall: MaxPool2d,
    rnn: BiLstm<B>,
    fc: Linear<B>,
    relu: Relu,
}

#[derive(Config, Debug)]
pub struct CrnnConfig {
    /// Alphabet size plus one for the CTC blank.
    pub num_classes: usize,
    #[config(default = 1)]
    pub input_channels: usize,
    #[config(default = 256)]
    pub hidden_size: usize,
}

impl CrnnConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> Crnn<B> {
        let conv3x3 = |c_in: usize, c_out: usize| {
            Conv2dConfig::new([c_in, c_out], [3, 3])
                .with_padding(PaddingConfig2d::Explicit(1, 1))
                .init(device)
        };
        Crnn {
            conv1: conv3x3(self.input_channels, 64),
            conv2: conv3x3(64, 128),
            conv3: conv3x3(128, 256),
            conv4: conv3x3(256, 256),
            conv5: Conv2dConfig::new([256, 512], [2, 1]).init(device),
            pool_square: MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init(),
            pool_tall: MaxPool2dConfig::new([2, 1]).with_strides([2, 1]).init(),
            rnn: BiLstmConfig::new(512, self.hidden_size, true).init(device),
            fc: LinearConfig::new(2 * self.hidden_size, self.num_classes).init(device),
            relu: Relu::new(),
        }
    }
}

impl<B: Backend> Crnn<B> {
    /// Forward pass: input [batch, 1, 32, W] -> per-timestep class scores
    /// [batch, W/4, num_classes].
    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 3> {
        let x = self.pool_square.forward(self.relu.forward(self.conv1.forward(input)));
        let x = self.pool_square.forward(self.relu.forward(self.conv2.forward(x)));
        let x = self.pool_tall.forward(self.relu.forward(self.conv3.forward(x)));
        let x = self.pool_tall.forward(self.relu.forward(self.conv4.forward(x)));
        let x = self.relu.forward(self.conv5.forward(x));

        let [batch, channels, _, width] = x.dims();
        let x = x.reshape([batch, channels, width]).swap_dims(1, 2);
        let (x, _) = self.rnn.forward(x, None);
        self.fc.forward(x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_output_shape_quarter_width() {
        let device = Default::default();
        let network = CrnnConfig::new(11).with_hidden_size(32).init::<TestBackend>(&device);

        let input = Tensor::zeros([1, 1, 32, 192], &device);
        let output = network.forward(input);
        assert_eq!(output.shape().dims, [1, 48, 11]);
    }

    #[test]
    fn test_batched_input() {
        let device = Default::default();
        let network = CrnnConfig::new(5).with_hidden_size(16).init::<TestBackend>(&device);

        let input = Tensor::zeros([2, 1, 32, 64], &device);
        let output = network.forward(input);
        assert_eq!(output.shape().dims, [2, 16, 5]);
    }
}
