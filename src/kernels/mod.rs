pub mod oriented_blend;
