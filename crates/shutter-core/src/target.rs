//! Target - the unit of work a `Task` invokes.
//!
//! # 学習ポイント
//! - Associated type (`Output`) で結果の型を固定
//! - クロージャ用アダプタ（`FnTarget`, `BoundTarget`）で async trait を実装
//! - 引数は「部分適用」で束縛する（動的な kwargs 辞書は使わない）

use std::future::Future;

use async_trait::async_trait;

use crate::error::TargetError;

/// Target は 1 回の呼び出しで 1 つの結果を返す
///
/// The engine never looks inside a target: camera capture, LED frames and
/// printer flashes are all just `invoke()` calls with side effects.
///
/// # 使用例
/// ```ignore
/// struct Blink { pin: u8 }
///
/// #[async_trait]
/// impl Target for Blink {
///     type Output = ();
///
///     async fn invoke(&self) -> Result<(), TargetError> {
///         toggle(self.pin).await;
///         Ok(())
///     }
/// }
/// ```
///
/// # Trait Bounds
/// - `Send + Sync + 'static`: worker コンテキストへ `Arc` で渡すため
#[async_trait]
pub trait Target: Send + Sync + 'static {
    type Output: Send + 'static;

    async fn invoke(&self) -> Result<Self::Output, TargetError>;
}

/// Adapts a no-argument async closure.
pub struct FnTarget<F> {
    f: F,
}

impl<F> FnTarget<F> {
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F, Fut, T> Target for FnTarget<F>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, TargetError>> + Send + 'static,
    T: Send + 'static,
{
    type Output = T;

    async fn invoke(&self) -> Result<T, TargetError> {
        (self.f)().await
    }
}

/// Adapts a closure over an argument value captured at construction.
///
/// Every invocation receives its own clone of `args`, so the closure can move
/// it into the returned future.
pub struct BoundTarget<A, F> {
    args: A,
    f: F,
}

impl<A, F> BoundTarget<A, F> {
    pub fn new(args: A, f: F) -> Self {
        Self { args, f }
    }

    pub fn args(&self) -> &A {
        &self.args
    }
}

#[async_trait]
impl<A, F, Fut, T> Target for BoundTarget<A, F>
where
    A: Clone + Send + Sync + 'static,
    F: Fn(A) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, TargetError>> + Send + 'static,
    T: Send + 'static,
{
    type Output = T;

    async fn invoke(&self) -> Result<T, TargetError> {
        (self.f)(self.args.clone()).await
    }
}

/// Shorthand for [`FnTarget::new`].
pub fn from_fn<F>(f: F) -> FnTarget<F> {
    FnTarget::new(f)
}

/// Shorthand for [`BoundTarget::new`].
pub fn bind<A, F>(args: A, f: F) -> BoundTarget<A, F> {
    BoundTarget::new(args, f)
}
