use burn::prelude::*;
use burn::{
    module::AutodiffModule,
    optim::{
        self, Optimizer, SgdConfig, SimpleOptimizer, adaptor::OptimizerAdaptor,
        decay::WeightDecayConfig, momentum::MomentumConfig,
    },
    tensor::backend::AutodiffBackend,
};

pub trait OptimConfigExt<AutoB, AutoM>
where
    Self: Config,
    AutoB: AutodiffBackend,
    AutoM: AutodiffModule<AutoB>,
{
    type Optim: SimpleOptimizer<AutoB::InnerBackend>;
    type Adaptor: Optimizer<AutoM, AutoB>;
    fn init(&self) -> Self::Adaptor;
}

impl<AutoB, AutoM> OptimConfigExt<AutoB, AutoM> for optim::SgdConfig
where
    Self: Config,
    AutoB: AutodiffBackend,
    AutoM: AutodiffModule<AutoB>,
{
    type Optim = burn::optim::Sgd<AutoB::InnerBackend>;
    type Adaptor = OptimizerAdaptor<Self::Optim, AutoM, AutoB>;
    fn init(&self) -> Self::Adaptor {
        optim::SgdConfig::init::<AutoB, AutoM>(self)
    }
}

pub const MOMENTUM: f64 = 0.9;
pub const L2: f32 = 5e-4;

/// SGD with nesterov momentum and L2 weight decay.
pub fn optimizer_config() -> SgdConfig {
    SgdConfig::new()
        .with_momentum(Some(
            MomentumConfig::new()
                .with_momentum(MOMENTUM)
                .with_dampening(0.0)
                .with_nesterov(true),
        ))
        .with_weight_decay(Some(WeightDecayConfig::new(L2)))
}
