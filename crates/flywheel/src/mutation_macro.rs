//! Macros for reducing combiner boilerplate.

/// Declare that a mutation type is not derived from an action type.
///
/// Every [`Combiner`](crate::Combiner) needs `Mutation: FromAction<Action>`.
/// Combiners that reuse the action as the mutation get this for free;
/// combiners with their own mutation type use this one-liner, and their
/// default `mutate` yields no mutations.
///
/// # Example
///
/// ```ignore
/// use flywheel_core::distinct_mutation;
///
/// enum TodoAction { Add(String), Toggle(usize) }
/// enum TodoMutation { Inserted(Todo), Flipped(usize) }
///
/// distinct_mutation!(TodoMutation, TodoAction);
/// ```
#[macro_export]
macro_rules! distinct_mutation {
    ($mutation:ty, $action:ty) => {
        impl $crate::FromAction<$action> for $mutation {}
    };
}
