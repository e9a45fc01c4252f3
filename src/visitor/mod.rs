pub mod attribution;
pub mod density;
pub mod impute;
pub mod nearneighbor;
pub mod score;
pub mod visitor;
