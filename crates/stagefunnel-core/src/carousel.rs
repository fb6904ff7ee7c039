//! Wrap-around image carousel shown on the result stage.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "CarouselState")]
pub struct Carousel {
    images: Vec<String>,
    index: usize,
}

#[derive(Deserialize)]
struct CarouselState {
    images: Vec<String>,
    #[serde(default)]
    index: usize,
}

impl TryFrom<CarouselState> for Carousel {
    type Error = ValidationError;

    fn try_from(state: CarouselState) -> Result<Self, Self::Error> {
        let mut carousel = Carousel::new(state.images)?;
        carousel.jump_to(state.index)?;
        Ok(carousel)
    }
}

impl Carousel {
    pub fn new(images: Vec<String>) -> Result<Self, ValidationError> {
        if images.is_empty() {
            return Err(ValidationError::EmptyCollection("carousel images".into()));
        }
        Ok(Self { images, index: 0 })
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    pub fn images(&self) -> &[String] {
        &self.images
    }

    pub fn current(&self) -> &str {
        &self.images[self.index]
    }

    pub fn next(&mut self) -> usize {
        self.index = (self.index + 1) % self.images.len();
        self.index
    }

    pub fn prev(&mut self) -> usize {
        self.index = (self.index + self.images.len() - 1) % self.images.len();
        self.index
    }

    pub fn jump_to(&mut self, index: usize) -> Result<usize, ValidationError> {
        if index >= self.images.len() {
            return Err(ValidationError::OutOfBounds {
                collection: "carousel".into(),
                index,
                len: self.images.len(),
            });
        }
        self.index = index;
        Ok(index)
    }
}
