pub(crate) mod mock;
mod stack;
