use burn::data::dataset::Dataset;

use crate::domain::example::Example;

/// In-memory examples of one split, exposed through Burn's Dataset trait
/// so the DataLoaders in `pipeline` can index them.
#[derive(Debug, Clone)]
pub struct ExampleDataset {
    examples: Vec<Example>,
}

impl ExampleDataset {
    pub fn new(examples: Vec<Example>) -> Self {
        Self { examples }
    }
}

impl Dataset<Example> for ExampleDataset {
    fn get(&self, index: usize) -> Option<Example> {
        self.examples.get(index).cloned()
    }

    fn len(&self) -> usize {
        self.examples.len()
    }
}
