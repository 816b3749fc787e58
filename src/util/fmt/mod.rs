pub mod error;
pub mod tree;

/// Where a source unit came from, used to render positions.
pub struct Context<'src> {
    pub filename: &'src str,
    pub src: &'src str,
}

/// Analogous to [`std::fmt::Display`], but also contains the source context,
/// so that spans may be rendered as `file:line:column`.
pub trait Show {
    fn show(&self, f: &mut std::fmt::Formatter<'_>, ctx: &Context<'_>) -> std::fmt::Result;

    /// Returns a type which can be displayed.
    fn display<'a>(&'a self, ctx: &'a Context<'_>) -> impl std::fmt::Display + 'a
    where
        Self: Sized,
    {
        Display(self, ctx)
    }
}

struct Display<'this, 'ctx, 'src, T: Show>(pub &'this T, pub &'ctx Context<'src>);

impl<T> std::fmt::Display for Display<'_, '_, '_, T>
where
    T: Show,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let Display(this, ctx) = self;
        this.show(f, ctx)
    }
}
