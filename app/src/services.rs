use anyhow::{Error, Result};

pub trait Request {
    type Resp;
}

pub trait Queryable<Req>
where
    Req: Request,
{
    fn query(&self, req: Req) -> Result<Req::Resp>;
}

pub trait Commandable<Req>
where
    Req: Request,
{
    fn execute(&self, req: Req) -> Result<Req::Resp>;
}

impl<'a, Req: Request, Q: Queryable<Req>> Queryable<Req> for &'a Q {
    fn query(&self, req: Req) -> Result<Req::Resp> {
        (**self).query(req)
    }
}

impl<'a, Req: Request, C: Commandable<Req>> Commandable<Req> for &'a C {
    fn execute(&self, req: Req) -> Result<Req::Resp> {
        (**self).execute(req)
    }
}

/// Where a value came from when a remote call may be substituted by local
/// data.
#[derive(Debug)]
pub enum Sourced<T> {
    Remote(T),
    Fallback { value: T, cause: Error },
}

impl<T> Sourced<T> {
    pub fn value(&self) -> &T {
        match self {
            Sourced::Remote(value) => value,
            Sourced::Fallback { value, .. } => value,
        }
    }

    pub fn into_value(self) -> T {
        match self {
            Sourced::Remote(value) => value,
            Sourced::Fallback { value, .. } => value,
        }
    }

    pub fn is_fallback(&self) -> bool {
        match self {
            Sourced::Remote(_) => false,
            Sourced::Fallback { .. } => true,
        }
    }

    pub fn cause(&self) -> Option<&Error> {
        match self {
            Sourced::Remote(_) => None,
            Sourced::Fallback { cause, .. } => Some(cause),
        }
    }
}
