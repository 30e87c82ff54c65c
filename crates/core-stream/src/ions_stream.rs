use crate::ion::IonHit;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IonValueType {
    pub name: &'static str,
}

impl IonValueType {
    pub const MASS_TO_CHARGE: IonValueType = IonValueType { name: "mass-to-charge" };
}

#[derive(Debug, Clone, PartialEq)]
pub struct IonsStream {
    pub hits: Vec<IonHit>,
    pub colour: (f32, f32, f32, f32),
    pub point_size: f32,
    pub value_type: IonValueType,
}

impl IonsStream {
    pub fn new(hits: Vec<IonHit>) -> Self {
        Self { hits, colour: (1.0, 1.0, 1.0, 1.0), point_size: 1.0, value_type: IonValueType::MASS_TO_CHARGE }
    }

    pub fn len(&self) -> usize {
        self.hits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }
}
