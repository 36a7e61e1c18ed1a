pub mod blocks;
mod discriminator;
mod generator;

pub use discriminator::{Discriminator, DiscriminatorConfig};
pub use generator::{Generator, GeneratorConfig};

use burn::{
    module::{Module, ModuleVisitor, ParamId},
    tensor::{backend::Backend, Tensor},
};

/// Collects the identity of every float tensor a module owns.
#[derive(Default)]
struct ParamIdCollector {
    ids: Vec<ParamId>,
}

impl<B: Backend> ModuleVisitor<B> for ParamIdCollector {
    fn visit_float<const D: usize>(&mut self, id: ParamId, _tensor: &Tensor<B, D>) {
        self.ids.push(id);
    }
}

/// Identities of the parameter storage behind `module`, in visit order.
///
/// Two handles to the same built network (e.g. a module and its
/// `valid()` copy) yield the same list.
pub fn param_ids<B: Backend, M: Module<B>>(module: &M) -> Vec<ParamId> {
    let mut collector = ParamIdCollector::default();
    module.visit(&mut collector);
    collector.ids
}
