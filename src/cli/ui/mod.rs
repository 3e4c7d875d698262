mod painter;

pub(crate) use self::painter::Painter;
