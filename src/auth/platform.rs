use oso::PolarClass;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Resource for actions that do not target an existing entity (publishing, booking, admin).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Platform {
    id: Uuid,
}

impl Platform {
    pub fn default() -> Self {
        Self { id: Uuid::nil() }
    }
}

impl PolarClass for Platform {
    fn get_polar_class_builder() -> oso::ClassBuilder<Platform> {
        oso::Class::builder()
            .name("Platform")
            .add_attribute_getter("id", |recv: &Platform| recv.id)
            .add_class_method("default", Platform::default)
    }

    fn get_polar_class() -> oso::Class {
        let builder = Platform::get_polar_class_builder();
        builder.build()
    }
}

/// A driver's wallet, addressed by account id.
#[derive(Clone, Debug, Serialize, Deserialize, PolarClass)]
pub struct Account {
    #[polar(attribute)]
    pub id: Uuid,
}

impl Account {
    pub fn new(id: Uuid) -> Self {
        Self { id }
    }
}
